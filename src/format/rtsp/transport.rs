use crate::{Result as VdkResult, VdkError};
use std::fmt;
use std::str::FromStr;

/// Option key carrying the transport selection.
pub const TRANSPORT_OPTION: &str = "rtsp_transport";

/// Lower transport requested from the decoding engine.
///
/// Only reliable, in-order transports are offered. Frames are decoded as a
/// continuous sequence and a lost unit corrupts every picture that refers
/// to it, so UDP delivery is rejected when parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtspTransport {
    /// RTP interleaved on the RTSP TCP connection.
    #[default]
    Tcp,
    /// RTSP tunnelled over HTTP.
    Http,
}

impl RtspTransport {
    /// Value written under [`TRANSPORT_OPTION`].
    pub fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Http => "http",
        }
    }
}

impl FromStr for RtspTransport {
    type Err = VdkError;

    fn from_str(s: &str) -> VdkResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(RtspTransport::Tcp),
            "http" => Ok(RtspTransport::Http),
            unreliable @ ("udp" | "udp_multicast" | "multicast") => Err(VdkError::Config(format!(
                "transport '{}' does not guarantee delivery, use tcp or http",
                unreliable
            ))),
            other => Err(VdkError::Config(format!("unknown RTSP transport '{}'", other))),
        }
    }
}

impl fmt::Display for RtspTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value options passed opaquely to
/// [`DecodingEngine::open`](crate::av::DecodingEngine::open).
///
/// Setting an existing key replaces its value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    entries: Vec<(String, String)>,
}

impl OpenOptions {
    /// Options requesting reliable (TCP) delivery.
    pub fn new() -> Self {
        Self::empty().with_transport(RtspTransport::Tcp)
    }

    /// Options without any entry, not even a transport.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets the transport entry.
    pub fn with_transport(mut self, transport: RtspTransport) -> Self {
        self.set(TRANSPORT_OPTION, transport.as_str());
        self
    }

    /// Builder form of [`set`](OpenOptions::set).
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts `key`, replacing an existing value in place.
    pub fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// The transport currently requested, if the option is present and valid.
    pub fn transport(&self) -> Option<RtspTransport> {
        self.get(TRANSPORT_OPTION)?.parse().ok()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entry is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses the `key=value;key=value` form produced by `Display`.
    pub fn parse(options: &str) -> VdkResult<Self> {
        let mut parsed = Self::empty();
        for part in options.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| VdkError::Config(format!("option '{}' has no value", part)))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(VdkError::Config(format!("option '{}' has no key", part)));
            }
            parsed.set(key, value.trim());
        }
        Ok(parsed)
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        f.write_str(&parts.join(";"))
    }
}
