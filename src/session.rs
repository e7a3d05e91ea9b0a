//! # Broker Session
//!
//! The thin MQTT client the connectivity supervisor drives: connect,
//! subscribe, keep-alive ping, and a poll loop that yields inbound
//! application messages. At-most-once delivery only; there is no publish
//! path and no packet-id bookkeeping beyond the subscribe handshake.

use crate::error::{ConnectReasonCode, ProtocolError, SessionError};
use crate::fmt::Debug2Format;
use crate::packet::{
    self, Connect, Inbound, PingReq, Publish, QoS, Subscribe, TYPE_PUBLISH,
};
use crate::transport::Transport;

/// Operations the supervisor and controller need from a pub/sub session.
#[allow(async_fn_in_trait)]
pub trait Broker {
    type Error: core::fmt::Debug;

    /// Open the session under the given client identifier.
    async fn connect(
        &mut self,
        client_id: &str,
        keep_alive_secs: u16,
    ) -> Result<(), Self::Error>;

    /// Subscribe to one topic filter.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error>;

    /// Send one keep-alive liveness signal.
    async fn ping(&mut self) -> Result<(), Self::Error>;

    /// Wait for the next inbound application message.
    async fn poll(&mut self) -> Result<Publish<'_>, Self::Error>;
}

impl<B: Broker + ?Sized> Broker for &mut B {
    type Error = B::Error;

    async fn connect(
        &mut self,
        client_id: &str,
        keep_alive_secs: u16,
    ) -> Result<(), Self::Error> {
        (**self).connect(client_id, keep_alive_secs).await
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        (**self).subscribe(topic, qos).await
    }

    async fn ping(&mut self) -> Result<(), Self::Error> {
        (**self).ping().await
    }

    async fn poll(&mut self) -> Result<Publish<'_>, Self::Error> {
        (**self).poll().await
    }
}

/// Scratch space for outbound handshake frames.
const TX_BUF: usize = 160;

/// MQTT session over any [`Transport`].
///
/// `BUF` bounds the receive buffer and therefore the largest inbound packet.
pub struct MqttSession<T, const BUF: usize = 1024> {
    transport: T,
    rx: [u8; BUF],
    rx_len: usize,
    /// Bytes at the front of `rx` already handed to the caller, discarded on
    /// the next read.
    pending: usize,
    next_packet_id: u16,
    connected: bool,
}

impl<T: Transport, const BUF: usize> MqttSession<T, BUF> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rx: [0; BUF],
            rx_len: 0,
            pending: 0,
            next_packet_id: 0,
            connected: false,
        }
    }

    /// Access the wrapped transport, e.g. to open the TCP connection.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Orderly teardown. The session must be reconnected before reuse.
    pub async fn disconnect(&mut self) -> Result<(), SessionError<T::Error>> {
        let mut frame = [0u8; 4];
        let n = packet::Disconnect.encode(&mut frame)?;
        self.send_frame(&frame[..n]).await?;
        self.connected = false;
        Ok(())
    }

    fn next_packet_id(&mut self) -> u16 {
        self.next_packet_id = self.next_packet_id.wrapping_add(1);
        if self.next_packet_id == 0 {
            self.next_packet_id = 1;
        }
        self.next_packet_id
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<(), SessionError<T::Error>> {
        self.transport
            .send(frame)
            .await
            .map_err(SessionError::Transport)
    }

    fn consume(&mut self, n: usize) {
        self.rx.copy_within(n..self.rx_len, 0);
        self.rx_len -= n;
    }

    /// Wait until one complete packet sits at the front of `rx`, returning
    /// its total length.
    async fn read_packet(&mut self) -> Result<usize, SessionError<T::Error>> {
        if self.pending > 0 {
            let n = self.pending;
            self.pending = 0;
            self.consume(n);
        }
        loop {
            match packet::packet_len(&self.rx[..self.rx_len])? {
                Some(n) if n <= self.rx_len => return Ok(n),
                Some(n) if n > BUF => {
                    return Err(SessionError::Protocol(ProtocolError::PayloadTooLarge));
                }
                _ => {}
            }
            if self.rx_len == BUF {
                return Err(SessionError::Protocol(ProtocolError::PayloadTooLarge));
            }
            let got = self
                .transport
                .recv(&mut self.rx[self.rx_len..])
                .await
                .map_err(SessionError::Transport)?;
            self.rx_len += got;
        }
    }
}

impl<T: Transport, const BUF: usize> Broker for MqttSession<T, BUF> {
    type Error = SessionError<T::Error>;

    async fn connect(
        &mut self,
        client_id: &str,
        keep_alive_secs: u16,
    ) -> Result<(), Self::Error> {
        // A reconnect starts from a clean slate.
        self.connected = false;
        self.rx_len = 0;
        self.pending = 0;

        let mut frame = [0u8; TX_BUF];
        let n = Connect {
            client_id,
            keep_alive: keep_alive_secs,
            clean_session: true,
        }
        .encode(&mut frame)?;
        self.send_frame(&frame[..n]).await?;

        // Nothing but CONNACK is legal before the handshake completes.
        let n = self.read_packet().await?;
        let ack = match packet::decode(&self.rx[..n])? {
            Inbound::ConnAck(ack) => ack,
            _ => return Err(SessionError::Protocol(ProtocolError::InvalidResponse)),
        };
        self.consume(n);

        match ConnectReasonCode::from(ack.reason_code) {
            ConnectReasonCode::Success => {
                self.connected = true;
                Ok(())
            }
            refused => Err(SessionError::ConnectionRefused(refused)),
        }
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        let packet_id = self.next_packet_id();
        let mut frame = [0u8; TX_BUF];
        let n = Subscribe {
            packet_id,
            topic,
            qos,
        }
        .encode(&mut frame)?;
        self.send_frame(&frame[..n]).await?;

        loop {
            let n = self.read_packet().await?;
            match packet::decode(&self.rx[..n])? {
                Inbound::SubAck(ack) => {
                    self.consume(n);
                    if ack.packet_id != packet_id {
                        return Err(SessionError::Protocol(ProtocolError::InvalidResponse));
                    }
                    // 0x00/0x01 grant a QoS; 0x80 is the failure code.
                    if ack.reason_code > QoS::AtLeastOnce as u8 {
                        return Err(SessionError::SubscribeRejected(ack.reason_code));
                    }
                    return Ok(());
                }
                // At-most-once: a message racing the handshake is droppable.
                Inbound::Publish(_) => {
                    debug!("dropping message received before suback");
                    self.consume(n);
                }
                Inbound::PingResp => self.consume(n),
                Inbound::ConnAck(_) => {
                    return Err(SessionError::Protocol(ProtocolError::InvalidResponse));
                }
            }
        }
    }

    async fn ping(&mut self) -> Result<(), Self::Error> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }
        let mut frame = [0u8; 4];
        let n = PingReq.encode(&mut frame)?;
        self.send_frame(&frame[..n]).await
    }

    async fn poll(&mut self) -> Result<Publish<'_>, Self::Error> {
        if !self.connected {
            return Err(SessionError::NotConnected);
        }

        let n = loop {
            let n = self.read_packet().await?;
            if self.rx[0] >> 4 == TYPE_PUBLISH {
                break n;
            }
            match packet::decode(&self.rx[..n]) {
                Ok(Inbound::PingResp) => trace!("pingresp"),
                Ok(_) => debug!("ignoring unexpected control packet"),
                Err(e) => warn!("malformed inbound packet: {:?}", Debug2Format(&e)),
            }
            self.consume(n);
        };

        // Hand the borrowed message out; the bytes are reclaimed on the next
        // read.
        self.pending = n;
        match packet::decode(&self.rx[..n])? {
            Inbound::Publish(msg) => Ok(msg),
            _ => Err(SessionError::Protocol(ProtocolError::InvalidResponse)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Debug, PartialEq, Eq)]
    struct PeerGone;

    /// Transport double fed from a script of inbound chunks.
    struct ScriptedTransport {
        inbound: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(inbound: &[&[u8]]) -> Self {
            Self {
                inbound: inbound.iter().map(|c| c.to_vec()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        type Error = PeerGone;

        async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error> {
            self.sent.push(buf.to_vec());
            Ok(())
        }

        async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let chunk = self.inbound.pop_front().ok_or(PeerGone)?;
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    const CONNACK_OK: &[u8] = &[0x20, 2, 0x00, 0x00];

    fn connected_session(
        inbound: &[&[u8]],
    ) -> MqttSession<ScriptedTransport, 256> {
        let mut chunks = vec![CONNACK_OK];
        chunks.extend_from_slice(inbound);
        let mut session = MqttSession::new(ScriptedTransport::new(&chunks));
        futures::executor::block_on(session.connect("tp-TEST", 30)).unwrap();
        session
    }

    #[test]
    fn connect_sends_connect_and_accepts_connack() {
        let mut session = connected_session(&[]);
        let sent = &session.transport_mut().sent;
        assert_eq!(sent.len(), 1);
        // CONNECT fixed header with the client id in the payload.
        assert_eq!(sent[0][0], 0x10);
        assert!(sent[0].ends_with(b"tp-TEST"));
    }

    #[test]
    fn connect_refusal_maps_the_reason_code() {
        let mut session =
            MqttSession::<_, 256>::new(ScriptedTransport::new(&[&[0x20, 2, 0x00, 0x05]]));
        let err = futures::executor::block_on(session.connect("tp-TEST", 30));
        assert!(matches!(
            err,
            Err(SessionError::ConnectionRefused(
                ConnectReasonCode::NotAuthorized
            ))
        ));
    }

    #[test]
    fn subscribe_completes_on_matching_suback() {
        // packet_id 1 is the first the session hands out.
        let mut session = connected_session(&[&[0x90, 3, 0, 1, 0x00]]);
        futures::executor::block_on(session.subscribe("sonos/current_track", QoS::AtMostOnce))
            .unwrap();
        assert_eq!(session.transport_mut().sent.len(), 2);
    }

    #[test]
    fn subscribe_failure_code_is_rejected() {
        let mut session = connected_session(&[&[0x90, 3, 0, 1, 0x80]]);
        let err = futures::executor::block_on(
            session.subscribe("sonos/current_track", QoS::AtMostOnce),
        );
        assert!(matches!(err, Err(SessionError::SubscribeRejected(0x80))));
    }

    #[test]
    fn poll_reassembles_a_split_publish() {
        // PUBLISH "t" -> "hello" split across two reads.
        let frame: &[u8] = &[0x30, 8, 0, 1, b't', b'h', b'e', b'l', b'l', b'o'];
        let mut session = connected_session(&[&frame[..4], &frame[4..]]);

        let msg = futures::executor::block_on(session.poll()).unwrap();
        assert_eq!(msg.topic, "t");
        assert_eq!(msg.payload, b"hello");
    }

    #[test]
    fn poll_skips_pingresp_and_returns_the_next_publish() {
        let mut session = connected_session(&[
            &[0xD0, 0],
            &[0x30, 4, 0, 1, b't', b'x'],
        ]);
        let msg = futures::executor::block_on(session.poll()).unwrap();
        assert_eq!(msg.payload, b"x");
    }

    #[test]
    fn two_publishes_in_one_read_are_delivered_in_order() {
        let mut session = connected_session(&[&[
            0x30, 4, 0, 1, b't', b'1', // first
            0x30, 4, 0, 1, b't', b'2', // second
        ]]);
        let first = futures::executor::block_on(session.poll()).unwrap().payload[0];
        assert_eq!(first, b'1');
        let second = futures::executor::block_on(session.poll()).unwrap().payload[0];
        assert_eq!(second, b'2');
    }

    #[test]
    fn ping_requires_a_connected_session() {
        let mut session =
            MqttSession::<_, 256>::new(ScriptedTransport::new(&[]));
        let err = futures::executor::block_on(session.ping());
        assert!(matches!(err, Err(SessionError::NotConnected)));
    }

    #[test]
    fn transport_loss_surfaces_as_a_transport_error() {
        let mut session = connected_session(&[]);
        let err = futures::executor::block_on(session.poll());
        assert!(matches!(err, Err(SessionError::Transport(PeerGone))));
    }
}
