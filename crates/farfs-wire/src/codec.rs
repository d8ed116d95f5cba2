//! Postcard encode/decode for [`Message`].

use std::fmt;

use crate::Message;

/// Failure to encode or decode a wire message.
#[derive(Debug)]
pub struct WireError(postcard::Error);

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire codec: {}", self.0)
    }
}

impl std::error::Error for WireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Encode a message to its postcard wire bytes.
pub fn encode(msg: &Message) -> Result<Vec<u8>, WireError> {
    postcard::to_stdvec(msg).map_err(WireError)
}

/// Decode a message from postcard wire bytes.
///
/// Trailing bytes after the message are rejected: a frame carries exactly
/// one message.
pub fn decode(bytes: &[u8]) -> Result<Message, WireError> {
    let (msg, rest) = postcard::take_from_bytes(bytes).map_err(WireError)?;
    if !rest.is_empty() {
        return Err(WireError(postcard::Error::DeserializeBadEncoding));
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Call, FileCall, FsCall, FsError, HandleDescriptor, OpenOptions, Reply};

    #[test]
    fn request_survives_the_wire() {
        let msg = Message::Request {
            id: 1,
            origin: "at RemoteFs::open".into(),
            call: Call::Fs(FsCall::Open {
                path: "/a.txt".into(),
                opts: OpenOptions::read_only(),
            }),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn response_with_handle_survives_the_wire() {
        let msg = Message::Response {
            id: 1,
            result: Ok(Reply::Handle(HandleDescriptor {
                fd: 3,
                path: "/a.txt".into(),
                position: 0,
            })),
        };
        let bytes = encode(&msg).unwrap();
        assert_eq!(decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn error_response_survives_the_wire() {
        let msg = Message::Response {
            id: 9,
            result: Err(FsError::not_found("/missing").push_origin("remote: stat")),
        };
        let bytes = encode(&msg).unwrap();
        let decoded = decode(&bytes).unwrap();
        match decoded {
            Message::Response {
                result: Err(err), ..
            } => {
                assert_eq!(err, FsError::not_found("/missing"));
                assert_eq!(err.origin(), Some("remote: stat"));
            }
            other => panic!("unexpected decode: {other:?}"),
        }
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        assert!(decode(&[0xff, 0xff, 0xff, 0xff]).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let msg = Message::Request {
            id: 2,
            origin: String::new(),
            call: Call::File {
                fd: 3,
                call: FileCall::Close,
            },
        };
        let mut bytes = encode(&msg).unwrap();
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }
}
