pub mod composite;
pub mod flood_fill;
pub mod line_art;
pub mod transform;
