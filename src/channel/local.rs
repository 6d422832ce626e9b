use super::ClassicalChannel;
use crate::core::errors::TransportError;
use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use tracing::{debug, warn};

#[derive(Debug)]
enum Frame {
    Values(Vec<u32>),
    Ack,
}

impl Frame {
    fn kind(&self) -> &'static str {
        match self {
            Frame::Values(_) => "values",
            Frame::Ack => "ack",
        }
    }
}

/// One end of an in-memory classical channel.
///
/// Frames are delivered in order; a receive blocks until the peer sends or hangs up.
pub struct LocalClassicalChannel {
    outbound: Sender<Frame>,
    inbound: Receiver<Frame>,
    closed: bool,
}

impl LocalClassicalChannel {
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = channel();
        let (b_tx, a_rx) = channel();
        (
            Self {
                outbound: a_tx,
                inbound: a_rx,
                closed: false,
            },
            Self {
                outbound: b_tx,
                inbound: b_rx,
                closed: false,
            },
        )
    }

    fn push(&self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Disconnected)
    }

    fn pull(&self) -> Result<Frame, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.inbound.recv().map_err(|_| TransportError::Disconnected)
    }

    /// Discards frames already delivered but not yet read.
    fn drain(&self) -> usize {
        let mut dropped = 0;
        loop {
            match self.inbound.try_recv() {
                Ok(_) => dropped += 1,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return dropped,
            }
        }
    }
}

impl ClassicalChannel for LocalClassicalChannel {
    fn send(&mut self, data: &[u32]) -> Result<(), TransportError> {
        self.push(Frame::Values(data.to_vec()))
    }

    fn receive(&mut self) -> Result<Vec<u32>, TransportError> {
        match self.pull()? {
            Frame::Values(values) => Ok(values),
            other => Err(TransportError::UnexpectedFrame {
                expected: "values",
                got: other.kind(),
            }),
        }
    }

    fn send_ack(&mut self) -> Result<(), TransportError> {
        self.push(Frame::Ack)
    }

    fn receive_ack(&mut self) -> Result<(), TransportError> {
        match self.pull()? {
            Frame::Ack => Ok(()),
            other => Err(TransportError::UnexpectedFrame {
                expected: "ack",
                got: other.kind(),
            }),
        }
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let dropped = self.drain();
        debug!(dropped, "cleared classical channel");
        Ok(())
    }

    fn force_clear(&mut self) -> Result<(), TransportError> {
        let dropped = self.drain();
        if dropped > 0 {
            warn!(dropped, "force-cleared classical channel with pending frames");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_arrive_in_order() {
        let (mut a, mut b) = LocalClassicalChannel::pair();
        a.send(&[1, 0, 1]).unwrap();
        a.send_ack().unwrap();
        b.send(&[42]).unwrap();
        assert_eq!(b.receive().unwrap(), vec![1, 0, 1]);
        b.receive_ack().unwrap();
        assert_eq!(a.receive().unwrap(), vec![42]);
    }

    #[test]
    fn ack_in_place_of_values_is_reported() {
        let (mut a, mut b) = LocalClassicalChannel::pair();
        a.send_ack().unwrap();
        let err = b.receive().unwrap_err();
        assert!(matches!(
            err,
            TransportError::UnexpectedFrame {
                expected: "values",
                got: "ack"
            }
        ));
    }

    #[test]
    fn clear_discards_pending_frames() {
        let (mut a, mut b) = LocalClassicalChannel::pair();
        a.send(&[1]).unwrap();
        a.send(&[0]).unwrap();
        b.clear().unwrap();
        a.send(&[7]).unwrap();
        assert_eq!(b.receive().unwrap(), vec![7]);
    }

    #[test]
    fn closed_end_rejects_traffic() {
        let (mut a, _b) = LocalClassicalChannel::pair();
        a.close().unwrap();
        assert!(matches!(a.send(&[1]), Err(TransportError::Closed)));
        assert!(a.force_clear().is_ok());
    }
}
