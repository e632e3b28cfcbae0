use bytes::Bytes;

/// One compressed unit as read from a [`MediaSource`](super::MediaSource).
///
/// `stream_index` refers to the position of the owning stream in the list
/// returned by [`MediaSource::streams`](super::MediaSource::streams).
#[derive(Debug, Clone)]
pub struct Packet {
    /// Compressed payload, opaque to the player
    pub data: Bytes,
    /// Presentation timestamp in stream time base units
    pub pts: Option<i64>,
    /// Index of the stream this unit belongs to
    pub stream_index: usize,
    /// Whether the unit starts a decodable picture sequence
    pub is_key: bool,
}

impl Packet {
    /// A unit of stream 0 without timing information.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            stream_index: 0,
            is_key: false,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Assigns the unit to a stream.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Marks the unit as a key unit.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True for a unit without payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_builder() {
        let packet = Packet::new(vec![0x00, 0x00, 0x01, 0x65])
            .with_stream_index(2)
            .with_pts(3000)
            .with_key_flag(true);

        assert_eq!(packet.stream_index, 2);
        assert_eq!(packet.pts, Some(3000));
        assert!(packet.is_key);
        assert_eq!(packet.len(), 4);
        assert!(!packet.is_empty());
        assert!(Packet::new(Bytes::new()).is_empty());
    }
}
