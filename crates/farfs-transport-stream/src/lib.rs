#![deny(unsafe_code)]

//! farfs-transport-stream: Length-prefixed framing for async byte streams.
//!
//! Each message is one frame: a 4-byte little-endian length prefix followed
//! by the postcard body. Works with any `AsyncRead + AsyncWrite` stream
//! (TCP, Unix sockets, `tokio::io::duplex` in tests).
//!
//! A frame that fails to decode is not one of this protocol's envelopes; it
//! is logged and skipped, since skipping it cannot strand a caller that the
//! frame was never going to resolve. Framing-level damage (a truncated
//! frame at EOF, an oversized length prefix) is unrecoverable and closes
//! the channel with an error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::warn;

use farfs_session::{ChannelError, MessageChannel};
use farfs_wire::Message;

const FRAME_LEN_PREFIX_SIZE: usize = 4;
const READ_CHUNK_SIZE: usize = 4096;
const RECV_BUF_COMPACT_THRESHOLD: usize = 64 * 1024;

/// Largest frame either side will produce or accept.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// A message channel over an async byte stream.
///
/// The stream is split once at construction; the two halves sit behind
/// separate async mutexes so sends never wait on the demux loop's pending
/// read.
pub struct FramedChannel<S> {
    reader: Mutex<FrameReader<ReadHalf<S>>>,
    writer: Mutex<WriteHalf<S>>,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// Wrap an async byte stream.
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        FramedChannel {
            reader: Mutex::new(FrameReader::new(read_half)),
            writer: Mutex::new(write_half),
        }
    }
}

impl<S> MessageChannel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn send(&self, msg: Message) -> Result<(), ChannelError> {
        let body = farfs_wire::encode(&msg).map_err(|e| ChannelError::Io(e.to_string()))?;
        let frame_len = u32::try_from(body.len())
            .ok()
            .filter(|len| *len <= MAX_FRAME_LEN)
            .ok_or_else(|| ChannelError::Io("message too large for one frame".into()))?;

        let mut writer = self.writer.lock().await;
        writer
            .write_all(&frame_len.to_le_bytes())
            .await
            .map_err(io_error)?;
        writer.write_all(&body).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;
        Ok(())
    }

    async fn recv(&self) -> Result<Message, ChannelError> {
        self.reader.lock().await.next_message().await
    }

    async fn close(&self) -> Result<(), ChannelError> {
        self.writer.lock().await.shutdown().await.map_err(io_error)
    }
}

fn io_error(err: std::io::Error) -> ChannelError {
    if err.kind() == std::io::ErrorKind::BrokenPipe
        || err.kind() == std::io::ErrorKind::UnexpectedEof
        || err.kind() == std::io::ErrorKind::ConnectionReset
    {
        ChannelError::Closed
    } else {
        ChannelError::Io(err.to_string())
    }
}

/// Buffered reader side: accumulates stream bytes and peels off complete
/// frames.
struct FrameReader<R> {
    stream: R,
    buf: Vec<u8>,
    unread_start: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(stream: R) -> Self {
        FrameReader {
            stream,
            buf: Vec::new(),
            unread_start: 0,
        }
    }

    async fn next_message(&mut self) -> Result<Message, ChannelError> {
        loop {
            match self.take_frame()? {
                Some(frame) => match farfs_wire::decode(&frame) {
                    Ok(msg) => return Ok(msg),
                    Err(err) => {
                        // Not one of ours; skip the frame and keep reading.
                        warn!(len = frame.len(), %err, "skipping undecodable frame");
                        continue;
                    }
                },
                None => {}
            }

            let mut tmp = [0u8; READ_CHUNK_SIZE];
            let n = self.stream.read(&mut tmp).await.map_err(io_error)?;
            if n == 0 {
                let trailing = self.buf.len() - self.unread_start;
                if trailing != 0 {
                    return Err(ChannelError::Io(format!(
                        "eof with {trailing} trailing bytes and no complete frame"
                    )));
                }
                return Err(ChannelError::Closed);
            }
            self.compact();
            self.buf.extend_from_slice(&tmp[..n]);
        }
    }

    /// Peel one complete frame off the buffer, if present.
    fn take_frame(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let unread = &self.buf[self.unread_start..];
        if unread.len() < FRAME_LEN_PREFIX_SIZE {
            return Ok(None);
        }

        let frame_len = u32::from_le_bytes([unread[0], unread[1], unread[2], unread[3]]);
        if frame_len > MAX_FRAME_LEN {
            return Err(ChannelError::Io(format!(
                "frame length {frame_len} exceeds limit"
            )));
        }
        let frame_len = frame_len as usize;
        if unread.len() < FRAME_LEN_PREFIX_SIZE + frame_len {
            return Ok(None);
        }

        let start = self.unread_start + FRAME_LEN_PREFIX_SIZE;
        let frame = self.buf[start..start + frame_len].to_vec();
        self.unread_start = start + frame_len;
        self.compact();
        Ok(Some(frame))
    }

    fn compact(&mut self) {
        if self.unread_start == self.buf.len() {
            self.buf.clear();
            self.unread_start = 0;
        } else if self.unread_start >= RECV_BUF_COMPACT_THRESHOLD
            && self.unread_start >= self.buf.len() / 2
        {
            self.buf.drain(..self.unread_start);
            self.unread_start = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farfs_wire::{Call, FsCall, Reply};

    fn request(id: u64) -> Message {
        Message::Request {
            id,
            origin: String::new(),
            call: Call::Fs(FsCall::Stat {
                path: "/a.txt".into(),
            }),
        }
    }

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let client = FramedChannel::new(client);
        let server = FramedChannel::new(server);

        client.send(request(1)).await.unwrap();
        assert_eq!(server.recv().await.unwrap().id(), 1);

        server
            .send(Message::Response {
                id: 1,
                result: Ok(Reply::Unit),
            })
            .await
            .unwrap();
        assert_eq!(client.recv().await.unwrap().id(), 1);
    }

    #[tokio::test]
    async fn frame_split_across_reads_is_reassembled() {
        let (raw, peer) = tokio::io::duplex(1024);
        let channel = FramedChannel::new(peer);

        let body = farfs_wire::encode(&request(7)).unwrap();
        let mut bytes = (body.len() as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&body);

        let mut raw = raw;
        let (first, rest) = bytes.split_at(3);
        raw.write_all(first).await.unwrap();
        raw.flush().await.unwrap();

        let recv = tokio::spawn(async move { channel.recv().await });
        tokio::task::yield_now().await;

        raw.write_all(rest).await.unwrap();
        raw.flush().await.unwrap();

        assert_eq!(recv.await.unwrap().unwrap().id(), 7);
    }

    #[tokio::test]
    async fn undecodable_frame_is_skipped() {
        let (mut raw, peer) = tokio::io::duplex(1024);
        let channel = FramedChannel::new(peer);

        // A well-framed payload that is not a farfs message.
        let garbage = [0xffu8, 0xff, 0xff, 0xff];
        raw.write_all(&(garbage.len() as u32).to_le_bytes())
            .await
            .unwrap();
        raw.write_all(&garbage).await.unwrap();

        let body = farfs_wire::encode(&request(3)).unwrap();
        raw.write_all(&(body.len() as u32).to_le_bytes())
            .await
            .unwrap();
        raw.write_all(&body).await.unwrap();
        raw.flush().await.unwrap();

        assert_eq!(channel.recv().await.unwrap().id(), 3);
    }

    #[tokio::test]
    async fn clean_eof_reports_closed() {
        let (raw, peer) = tokio::io::duplex(1024);
        let channel = FramedChannel::new(peer);
        drop(raw);
        assert_eq!(channel.recv().await, Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn truncated_frame_at_eof_is_an_error() {
        let (mut raw, peer) = tokio::io::duplex(1024);
        let channel = FramedChannel::new(peer);

        raw.write_all(&100u32.to_le_bytes()).await.unwrap();
        raw.write_all(b"short").await.unwrap();
        raw.flush().await.unwrap();
        drop(raw);

        match channel.recv().await {
            Err(ChannelError::Io(msg)) => assert!(msg.contains("trailing")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut raw, peer) = tokio::io::duplex(1024);
        let channel = FramedChannel::new(peer);

        raw.write_all(&u32::MAX.to_le_bytes()).await.unwrap();
        raw.flush().await.unwrap();

        match channel.recv().await {
            Err(ChannelError::Io(msg)) => assert!(msg.contains("exceeds limit")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
