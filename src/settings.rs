use std::path::{Path, PathBuf};

use crate::canvas::{DEFAULT_SPOT_AREA, DEFAULT_THRESHOLD};
use crate::ops::line_art::{ChannelFlags, LineArtProcessor};

/// Persisted defaults for tracing scanned drawings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceSettings {
    /// Gray level at or above which a pixel is paper (0–255).
    pub threshold: i32,
    /// Enclosed holes smaller than this many pixels get filled.
    pub spot_area: i32,
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    /// Crop traced frames to their ink; when off they keep the page extent.
    pub auto_crop: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            spot_area: DEFAULT_SPOT_AREA,
            red: false,
            green: false,
            blue: false,
            auto_crop: true,
        }
    }
}

impl TraceSettings {
    pub fn channels(&self) -> ChannelFlags {
        ChannelFlags::guides(self.red, self.green, self.blue)
    }

    pub fn processor(&self) -> LineArtProcessor {
        LineArtProcessor::new(self.threshold, self.spot_area, self.channels())
    }

    /// Force values into their valid ranges.
    pub fn clamped(mut self) -> Self {
        self.threshold = self.threshold.clamp(0, 255);
        self.spot_area = self.spot_area.max(0);
        self
    }

    /// Path to the settings file, creating its directory if needed.
    ///
    /// On Linux: $XDG_CONFIG_HOME/inkscan/inkscan_settings.cfg (or ~/.config/inkscan/…)
    /// On Windows: %APPDATA%\InkScan\inkscan_settings.cfg
    /// On macOS:   ~/Library/Application Support/InkScan/inkscan_settings.cfg
    pub fn settings_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let config_dir = std::env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                    PathBuf::from(home).join(".config")
                })
                .join("inkscan");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("inkscan_settings.cfg"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok()?;
            let config_dir = PathBuf::from(appdata).join("InkScan");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("inkscan_settings.cfg"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            let config_dir = PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("InkScan");
            let _ = std::fs::create_dir_all(&config_dir);
            return Some(config_dir.join("inkscan_settings.cfg"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe()
                .ok()
                .and_then(|p| p.parent().map(|d| d.join("inkscan_settings.cfg")))
        }
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::settings_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load `key=value` lines from `path`.  Missing files, unknown keys and
    /// unparsable values fall back to the defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else { return Self::default() };

        let mut s = Self::default();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let key = key.trim();
            let val = val.trim();
            match key {
                "threshold" => match val.parse() {
                    Ok(v) => s.threshold = v,
                    Err(_) => log_warn!("Settings: bad threshold {:?}, using default", val),
                },
                "spot_area" => match val.parse() {
                    Ok(v) => s.spot_area = v,
                    Err(_) => log_warn!("Settings: bad spot_area {:?}, using default", val),
                },
                "red" => s.red = val == "true",
                "green" => s.green = val == "true",
                "blue" => s.blue = val == "true",
                "auto_crop" => s.auto_crop = val != "false",
                other => log_warn!("Settings: unknown key {:?} ignored", other),
            }
        }
        s.clamped()
    }

    /// Save to the default location; failures are logged.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log_warn!("Could not save settings to {}: {}", path.display(), e);
        }
    }

    /// Write every key as `key=value`.
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let content = format!(
            "threshold={}\n\
             spot_area={}\n\
             red={}\n\
             green={}\n\
             blue={}\n\
             auto_crop={}\n",
            self.threshold, self.spot_area, self.red, self.green, self.blue, self.auto_crop,
        );
        std::fs::write(path, content)
    }
}
