use crate::error::{Result, VdkError};
use crate::format::rtsp::{Endpoint, RtspTransport};
use crate::player::{PlayOptions, StreamSelection};
use log::{debug, warn};
use std::env;
use std::fs;
use std::path::Path;

/// Endpoint used when nothing else is configured.
pub const DEFAULT_RTSP_URL: &str = "rtsp://example.com:554/stream";

/// Files probed by [`Config::load`], in order. The first readable one wins.
pub const CONFIG_PATHS: [&str; 2] = ["./config.toml", "./vdkplay_config.toml"];

/// Overrides [`Config::rtsp_url`].
pub const ENV_RTSP_URL: &str = "VDKPLAY_RTSP_URL";
/// Overrides [`Config::transport`]; `tcp` or `http`.
pub const ENV_RTSP_TRANSPORT: &str = "VDKPLAY_RTSP_TRANSPORT";
/// Overrides [`Config::stream_selection`]; `first` or `last`.
pub const ENV_STREAM_SELECTION: &str = "VDKPLAY_STREAM_SELECTION";

/// Contents written by [`create_default_config_template`].
pub const CONFIG_TEMPLATE: &str = r#"# VDKPLAY Configuration
# This is a template. Replace the values with your actual configuration.

# RTSP URL of the stream to play
rtsp_url = "rtsp://example.com:554/stream"

# Lower transport handed to the decoding engine: tcp or http (UDP is rejected)
rtsp_transport = "tcp"

# Which video stream to decode when a source has several: first, last
stream_selection = "first"
"#;

/// Settings for playing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Endpoint to play
    pub rtsp_url: String,
    /// Reliable transport requested from the engine
    pub transport: RtspTransport,
    /// Video stream choice when a source has several
    pub stream_selection: StreamSelection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rtsp_url: DEFAULT_RTSP_URL.to_string(),
            transport: RtspTransport::Tcp,
            stream_selection: StreamSelection::First,
        }
    }
}

impl Config {
    /// Defaults, then environment variables, then the first config file found
    /// in [`CONFIG_PATHS`].
    pub fn load() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env(|key| env::var(key).ok())?;

        for path in &CONFIG_PATHS {
            if config.apply_file(path)? {
                break;
            }
        }

        Ok(config)
    }

    /// Applies the `VDKPLAY_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in [ENV_RTSP_URL, ENV_RTSP_TRANSPORT, ENV_STREAM_SELECTION] {
            if let Some(value) = lookup(key) {
                let name = match key {
                    ENV_RTSP_URL => "rtsp_url",
                    ENV_RTSP_TRANSPORT => "rtsp_transport",
                    _ => "stream_selection",
                };
                self.set(name, &value)?;
            }
        }
        Ok(())
    }

    /// Applies a config file. Returns `Ok(false)` when it cannot be read.
    pub fn apply_file<P: AsRef<Path>>(&mut self, path: P) -> Result<bool> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("Skipping config file {}: {}", path.display(), e);
                return Ok(false);
            }
        };
        debug!("Loading config file {}", path.display());
        self.apply_str(&content)?;
        Ok(true)
    }

    /// Applies `key = "value"` lines. Blank lines and `#` comments are
    /// skipped and unknown keys are ignored with a warning.
    pub fn apply_str(&mut self, content: &str) -> Result<()> {
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| VdkError::Config(format!("expected 'key = value', got '{}'", line)))?;
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if value.is_empty() {
                continue;
            }
            self.set(key.trim(), value)?;
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "rtsp_url" => self.rtsp_url = value.trim().to_string(),
            "rtsp_transport" => self.transport = value.parse()?,
            "stream_selection" => self.stream_selection = value.parse()?,
            other => warn!("Ignoring unknown config key '{}'", other),
        }
        Ok(())
    }

    /// The validated [`rtsp_url`](Config::rtsp_url).
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.rtsp_url)
    }

    /// Player options carrying this config's transport and stream selection.
    pub fn play_options(&self) -> PlayOptions {
        PlayOptions::new()
            .with_transport(self.transport)
            .with_stream_selection(self.stream_selection)
    }
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        fs::write(path, CONFIG_TEMPLATE)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_template_round_trips_to_defaults() {
        let mut config = Config::default();
        config.apply_str(CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_apply_str() {
        let mut config = Config::default();
        config
            .apply_str(
                "# camera\nrtsp_url = 'rtsp://cam.local/live'\n\nrtsp_transport = \"http\"\nstream_selection=last\ncolor = red\n",
            )
            .unwrap();

        assert_eq!(
            config,
            Config {
                rtsp_url: "rtsp://cam.local/live".to_string(),
                transport: RtspTransport::Http,
                stream_selection: StreamSelection::Last,
            }
        );
        assert_eq!(config.endpoint().unwrap().host(), "cam.local");
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        assert!(matches!(
            config.apply_str("rtsp_transport = carrier-pigeon"),
            Err(VdkError::Config(_))
        ));
        assert!(matches!(config.apply_str("just words"), Err(VdkError::Config(_))));
    }

    #[test]
    fn test_unreliable_transport_rejected() {
        let mut config = Config::default();
        assert!(matches!(
            config.apply_str("rtsp_transport = \"udp\""),
            Err(VdkError::Config(_))
        ));
        assert!(matches!(
            config.apply_env(|key| (key == ENV_RTSP_TRANSPORT).then(|| "udp_multicast".to_string())),
            Err(VdkError::Config(_))
        ));
        assert_eq!(config.transport, RtspTransport::Tcp);
        assert_eq!(config.play_options().open_options().get("rtsp_transport"), Some("tcp"));
    }

    #[test]
    fn test_apply_env() {
        let vars: HashMap<&str, &str> = [
            (ENV_RTSP_URL, "rtsp://10.1.1.1/ch1"),
            (ENV_STREAM_SELECTION, "last"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.rtsp_url, "rtsp://10.1.1.1/ch1");
        assert_eq!(config.transport, RtspTransport::Tcp);
        assert_eq!(config.stream_selection, StreamSelection::Last);
    }

    #[test]
    fn test_apply_missing_file() {
        let mut config = Config::default();
        assert!(!config.apply_file("./does/not/exist.toml").unwrap());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_create_template_and_load_it() {
        let path = std::env::temp_dir().join(format!("vdkplay-config-{}.toml", std::process::id()));
        let _ = fs::remove_file(&path);

        create_default_config_template(&path).unwrap();
        fs::write(&path, "rtsp_url = \"rtsp://edited/stream\"\n").unwrap();
        // An existing file is left alone.
        create_default_config_template(&path).unwrap();

        let mut config = Config::default();
        assert!(config.apply_file(&path).unwrap());
        assert_eq!(config.rtsp_url, "rtsp://edited/stream");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_play_options() {
        let config = Config {
            transport: RtspTransport::Http,
            ..Config::default()
        };
        let options = config.play_options();
        assert_eq!(options.transport, RtspTransport::Http);
        assert_eq!(options.open_options().get("rtsp_transport"), Some("http"));
    }
}
