//! Frames: the unit of exchange on a Parley connection.
//!
//! ```text
//! ┌────────────┬──────────────────────┬─────────────────────┐
//! │ command u8 │ payload_len u16 (BE) │ payload; payload_len │
//! └────────────┴──────────────────────┴─────────────────────┘
//! ```
//!
//! [`read_frame`] blocks only the calling task: it loops on partial reads
//! until the header and then the whole payload have arrived. No state is
//! kept between calls other than the stream's own read position.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::codec::{PayloadReader, PayloadWriter, WireFormat};
use crate::error::FrameStage;
use crate::{Command, ProtocolError};

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 3;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// One complete header + payload unit.
///
/// The command is kept as a raw byte so that frames with ids this build
/// doesn't know can still be read and answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: u8,
    payload: Vec<u8>,
}

impl Frame {
    /// Creates a frame from a raw command byte and payload.
    ///
    /// # Errors
    /// `ProtocolError::PayloadTooLarge` if the payload doesn't fit the
    /// 2-byte length header.
    pub fn new(command: u8, payload: Vec<u8>) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge(payload.len()));
        }
        Ok(Self { command, payload })
    }

    /// Encodes `value` as the payload of a frame for `command`.
    pub fn from_value<T: WireFormat>(
        command: Command,
        value: &T,
    ) -> Result<Self, ProtocolError> {
        let mut w = PayloadWriter::new();
        value.encode(&mut w)?;
        Self::new(command.into(), w.into_bytes())
    }

    /// Decodes the whole payload as a `T`, rejecting trailing bytes.
    pub fn decode<T: WireFormat>(&self) -> Result<T, ProtocolError> {
        let mut r = PayloadReader::new(&self.payload);
        let value = T::decode(&mut r)?;
        r.finish()?;
        Ok(value)
    }

    /// The raw command byte.
    pub fn command_id(&self) -> u8 {
        self.command
    }

    /// The command, if the id is a known one.
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes header + payload into one contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.push(self.command);
        // `new` guarantees the length fits in a u16.
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Reads the next frame from `reader`.
///
/// Returns `Ok(None)` if the stream ends cleanly before the first header
/// byte. Any close after that point is `ProtocolError::ConnectionClosed`.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    let got = read_full(reader, &mut header).await?;
    if got == 0 {
        return Ok(None);
    }
    if got < HEADER_SIZE {
        return Err(ProtocolError::ConnectionClosed {
            stage: FrameStage::Header,
            read: got,
            expected: HEADER_SIZE,
        });
    }

    let command = header[0];
    let len = u16::from_be_bytes([header[1], header[2]]) as usize;

    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload).await?;
    if got < len {
        return Err(ProtocolError::ConnectionClosed {
            stage: FrameStage::Payload,
            read: got,
            expected: len,
        });
    }

    Ok(Some(Frame { command, payload }))
}

/// Writes one frame with a single `write_all`.
pub async fn write_frame<W>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&frame.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Fills `buf` unless EOF comes first; returns how many bytes were read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_header_layout() {
        let frame = Frame::new(3, vec![0xAA; 258]).unwrap();
        let bytes = frame.encode();
        assert_eq!(&bytes[..3], &[3, 0x01, 0x02]);
        assert_eq!(bytes.len(), HEADER_SIZE + 258);
    }

    #[test]
    fn test_new_oversized_payload_returns_error() {
        let err = Frame::new(1, vec![0; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(65536)));
    }

    #[test]
    fn test_command_unknown_id_is_none() {
        let frame = Frame::new(200, vec![]).unwrap();
        assert_eq!(frame.command(), None);
        assert_eq!(frame.command_id(), 200);
    }

    #[tokio::test]
    async fn test_read_frame_clean_eof_returns_none() {
        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_empty_payload() {
        let mut bytes: &[u8] = &[8, 0, 0];
        let frame = read_frame(&mut bytes).await.unwrap().unwrap();
        assert_eq!(frame.command_id(), 8);
        assert!(frame.payload().is_empty());
    }

    #[tokio::test]
    async fn test_read_frame_eof_in_header_is_connection_closed() {
        let mut bytes: &[u8] = &[1, 0];
        let err = read_frame(&mut bytes).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ConnectionClosed {
                stage: FrameStage::Header,
                read: 2,
                expected: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_read_frame_eof_in_payload_is_connection_closed() {
        let mut bytes: &[u8] = &[1, 0, 4, b'a', b'b'];
        let err = read_frame(&mut bytes).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::ConnectionClosed {
                stage: FrameStage::Payload,
                read: 2,
                expected: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_read_frame_consecutive_frames_leave_cursor_aligned() {
        let mut wire = Frame::new(1, b"one".to_vec()).unwrap().encode();
        wire.extend(Frame::new(2, b"two!".to_vec()).unwrap().encode());
        let mut reader: &[u8] = &wire;

        let a = read_frame(&mut reader).await.unwrap().unwrap();
        let b = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!((a.command_id(), a.payload()), (1, &b"one"[..]));
        assert_eq!((b.command_id(), b.payload()), (2, &b"two!"[..]));
        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_reassembles_one_byte_chunks() {
        // A duplex pipe with a 1-byte buffer forces every read to be partial.
        let (mut client, mut server) = tokio::io::duplex(1);
        let frame = Frame::new(3, "héllo wörld".as_bytes().to_vec()).unwrap();
        let wire = frame.encode();

        let writer = tokio::spawn(async move {
            client.write_all(&wire).await.unwrap();
        });

        let got = read_frame(&mut server).await.unwrap().unwrap();
        writer.await.unwrap();
        assert_eq!(got, frame);
    }

    #[tokio::test]
    async fn test_write_frame_then_read_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let frame = Frame::new(10, vec![1, 2, 3]).unwrap();
        write_frame(&mut a, &frame).await.unwrap();
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), frame);
    }
}
