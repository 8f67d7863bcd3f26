use tonic::Status;
use tonic::codec::{BufferSettings, Codec, EncodeBuf, Encoder};

/// One item of an outgoing request stream.
#[derive(Debug)]
pub enum Outgoing<T> {
    Message(T),
    /// Fail the request body. The transport resets the stream with an error,
    /// so the peer sees a broken stream instead of a half-close.
    Abort(Status),
}

/// Wraps a message codec so a request stream can abort itself.
///
/// `Outgoing::Message` is encoded by the inner codec; `Outgoing::Abort` turns
/// into an encode error, which fails the client request body.
#[derive(Debug, Clone, Default)]
pub struct AbortableCodec<C> {
    inner: C,
}

impl<C> AbortableCodec<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

impl<C: Codec> Codec for AbortableCodec<C> {
    type Encode = Outgoing<C::Encode>;
    type Decode = C::Decode;
    type Encoder = AbortableEncoder<C::Encoder>;
    type Decoder = C::Decoder;

    fn encoder(&mut self) -> Self::Encoder {
        AbortableEncoder {
            inner: self.inner.encoder(),
        }
    }

    fn decoder(&mut self) -> Self::Decoder {
        self.inner.decoder()
    }
}

#[derive(Debug)]
pub struct AbortableEncoder<E> {
    inner: E,
}

impl<E> Encoder for AbortableEncoder<E>
where
    E: Encoder<Error = Status>,
{
    type Item = Outgoing<E::Item>;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Status> {
        match item {
            Outgoing::Message(message) => self.inner.encode(message, dst),
            Outgoing::Abort(status) => Err(status),
        }
    }

    fn buffer_settings(&self) -> BufferSettings {
        self.inner.buffer_settings()
    }
}
