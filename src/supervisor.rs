//! # Connectivity Supervisor
//!
//! Owns the bring-up state machine: radio join, address acquisition, broker
//! connect, topic subscribe, then periodic keep-alive. Radio steps are
//! expected to fluctuate and retry forever with a fixed delay; broker steps
//! failing after a successful join point at misconfiguration and surface to
//! the caller as fatal-class errors instead of spinning silently.
//!
//! All pacing goes through an injected [`DelayNs`], so tests drive the
//! machine without real sleeping.

use embassy_time::{Duration, Instant};
use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::{BrokerConfig, NetworkConfig, client_id};
use crate::error::SupervisorError;
use crate::fmt::Debug2Format;
use crate::link::Radio;
use crate::packet::QoS;
use crate::session::Broker;

/// Connection bring-up progress. Strictly forward-progressing on success; a
/// failed step resets only that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionState {
    Disconnected,
    RadioJoining,
    RadioJoined,
    BrokerConnecting,
    BrokerConnected,
    Subscribed,
}

/// Timing knobs. Defaults match the reference device: 2 s between join
/// attempts, 1 s between address polls, a 30 s keep-alive, and a 5 s pause
/// after a fatal-class failure.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SupervisorConfig {
    pub join_retry_delay_ms: u32,
    pub addr_poll_delay_ms: u32,
    pub keep_alive: Duration,
    pub fail_delay_ms: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            join_retry_delay_ms: 2000,
            addr_poll_delay_ms: 1000,
            keep_alive: Duration::from_secs(30),
            fail_delay_ms: 5000,
        }
    }
}

/// Deadline tracker for the periodic keep-alive ping.
///
/// Pure bookkeeping over instants, so the cadence is testable against
/// synthetic clocks. Deadlines advance from the scheduled time, not from the
/// observation time, so a late poll does not drift the schedule.
#[derive(Debug, Clone, Copy)]
pub struct Heartbeat {
    interval: Duration,
    next: Instant,
}

impl Heartbeat {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self {
            interval,
            next: now + interval,
        }
    }

    /// The next instant a ping is due.
    pub fn deadline(&self) -> Instant {
        self.next
    }

    /// True when a ping is due at `now`; advances the deadline.
    pub fn due(&mut self, now: Instant) -> bool {
        if now >= self.next {
            self.next += self.interval;
            true
        } else {
            false
        }
    }
}

/// Drives a [`Radio`] and a [`Broker`] session to the subscribed state and
/// keeps the session alive.
pub struct Supervisor<R, B, D, G> {
    radio: R,
    session: B,
    delay: D,
    rng: G,
    state: ConnectionState,
    config: SupervisorConfig,
}

impl<R, B, D, G> Supervisor<R, B, D, G>
where
    R: Radio,
    B: Broker,
    D: DelayNs,
    G: RngCore,
{
    pub fn new(radio: R, session: B, delay: D, rng: G, config: SupervisorConfig) -> Self {
        Self {
            radio,
            session,
            delay,
            rng,
            state: ConnectionState::Disconnected,
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Access the session, e.g. to poll for inbound messages.
    pub fn session_mut(&mut self) -> &mut B {
        &mut self.session
    }

    /// Drive the state machine to [`ConnectionState::Subscribed`].
    ///
    /// Returns only once subscribed or on a fatal-class failure. A radio
    /// association surviving from an earlier cycle is kept.
    pub async fn bring_up(
        &mut self,
        net: &NetworkConfig<'_>,
        broker: &BrokerConfig<'_>,
    ) -> Result<(), SupervisorError<R::Error, B::Error>> {
        if self.state < ConnectionState::RadioJoined {
            self.join_radio(net).await;
        }
        self.connect_broker(broker).await?;
        self.subscribe(broker).await?;
        Ok(())
    }

    /// Join the network and wait for an address. Retries without bound.
    async fn join_radio(&mut self, net: &NetworkConfig<'_>) {
        self.state = ConnectionState::RadioJoining;

        let mut attempt = 1u32;
        loop {
            info!("joining network {}", net.ssid);
            match self.radio.join(net.ssid, net.passphrase).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        "radio join failed (attempt {}): {:?}",
                        attempt,
                        Debug2Format(&e)
                    );
                    attempt += 1;
                    self.delay.delay_ms(self.config.join_retry_delay_ms).await;
                }
            }
        }

        loop {
            if let Some(addr) = self.radio.address() {
                info!("address acquired: {:?}", Debug2Format(&addr));
                break;
            }
            debug!("waiting for address");
            self.delay.delay_ms(self.config.addr_poll_delay_ms).await;
        }

        self.state = ConnectionState::RadioJoined;
    }

    async fn connect_broker(
        &mut self,
        broker: &BrokerConfig<'_>,
    ) -> Result<(), SupervisorError<R::Error, B::Error>> {
        self.state = ConnectionState::BrokerConnecting;

        // Fresh identifier per attempt, so stale broker state from an
        // earlier boot cannot collide with this session.
        let id = client_id(broker.client_prefix, broker.board_id, &mut self.rng);
        info!("connecting to broker as {}", id.as_str());

        let keep_alive_secs = self.config.keep_alive.as_secs() as u16;
        self.session
            .connect(id.as_str(), keep_alive_secs)
            .await
            .map_err(|e| {
                error!("mqtt connect: {:?}", Debug2Format(&e));
                SupervisorError::Connect(e)
            })?;

        self.state = ConnectionState::BrokerConnected;
        Ok(())
    }

    async fn subscribe(
        &mut self,
        broker: &BrokerConfig<'_>,
    ) -> Result<(), SupervisorError<R::Error, B::Error>> {
        info!("subscribing to {}", broker.topic);
        self.session
            .subscribe(broker.topic, QoS::AtMostOnce)
            .await
            .map_err(|e| {
                error!("mqtt subscribe: {:?}", Debug2Format(&e));
                SupervisorError::Subscribe(e)
            })?;

        self.state = ConnectionState::Subscribed;
        Ok(())
    }

    /// Send one keep-alive ping.
    pub async fn heartbeat(&mut self) -> Result<(), SupervisorError<R::Error, B::Error>> {
        self.session.ping().await.map_err(|e| {
            error!("ping: {:?}", Debug2Format(&e));
            SupervisorError::Heartbeat(e)
        })
    }

    /// Roll back to [`ConnectionState::RadioJoined`] after a fatal-class
    /// failure, keeping the radio association so the next cycle starts at
    /// the broker connect.
    pub fn reset_session(&mut self) {
        if self.state > ConnectionState::RadioJoined {
            self.state = ConnectionState::RadioJoined;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Publish;
    use core::convert::Infallible;
    use core::net::Ipv4Addr;
    use std::vec::Vec;

    #[derive(Debug, PartialEq, Eq)]
    struct StepFailed;

    /// Radio double that fails a configured number of joins before
    /// succeeding.
    struct FlakyRadio {
        failures_left: u32,
        attempts: u32,
        joined: bool,
    }

    impl FlakyRadio {
        fn failing(failures: u32) -> Self {
            Self {
                failures_left: failures,
                attempts: 0,
                joined: false,
            }
        }
    }

    impl Radio for FlakyRadio {
        type Error = StepFailed;

        async fn join(&mut self, _ssid: &str, _passphrase: &str) -> Result<(), Self::Error> {
            self.attempts += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(StepFailed);
            }
            self.joined = true;
            Ok(())
        }

        fn address(&self) -> Option<Ipv4Addr> {
            self.joined.then_some(Ipv4Addr::new(192, 168, 1, 50))
        }
    }

    /// Broker double that records calls and fails where told to.
    #[derive(Default)]
    struct FakeBroker {
        fail_connect: bool,
        fail_subscribe: bool,
        connects: Vec<std::string::String>,
        subscribes: Vec<std::string::String>,
        pings: u32,
    }

    impl Broker for FakeBroker {
        type Error = StepFailed;

        async fn connect(
            &mut self,
            client_id: &str,
            _keep_alive_secs: u16,
        ) -> Result<(), Self::Error> {
            self.connects.push(client_id.into());
            if self.fail_connect {
                return Err(StepFailed);
            }
            Ok(())
        }

        async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), Self::Error> {
            self.subscribes.push(topic.into());
            if self.fail_subscribe {
                return Err(StepFailed);
            }
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), Self::Error> {
            self.pings += 1;
            Ok(())
        }

        async fn poll(&mut self) -> Result<Publish<'_>, Self::Error> {
            Err(StepFailed)
        }
    }

    /// Delay double that returns immediately, tallying requested waits.
    #[derive(Default)]
    struct CountingDelay {
        waits_ms: Vec<u32>,
    }

    impl DelayNs for CountingDelay {
        async fn delay_ns(&mut self, ns: u32) {
            self.waits_ms.push(ns / 1_000_000);
        }

        async fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    struct FixedRng(u32);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0
        }

        fn next_u64(&mut self) -> u64 {
            self.0 as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0 as u8);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    const NET: NetworkConfig<'static> = NetworkConfig {
        ssid: "shed",
        passphrase: "hunter2",
    };

    fn broker_config() -> BrokerConfig<'static> {
        BrokerConfig {
            addr: core::net::SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 1883),
            topic: "sonos/current_track",
            client_prefix: "trackpanel",
            board_id: "m4",
        }
    }

    fn supervisor(
        radio: FlakyRadio,
        session: FakeBroker,
    ) -> Supervisor<FlakyRadio, FakeBroker, CountingDelay, FixedRng> {
        Supervisor::new(
            radio,
            session,
            CountingDelay::default(),
            FixedRng(3),
            SupervisorConfig::default(),
        )
    }

    #[test]
    fn join_retries_until_the_radio_comes_up() {
        let mut sup = supervisor(FlakyRadio::failing(2), FakeBroker::default());
        futures::executor::block_on(sup.bring_up(&NET, &broker_config())).unwrap();

        // Two failures then success: exactly three attempts, no step skipped.
        assert_eq!(sup.radio().attempts, 3);
        assert_eq!(sup.state(), ConnectionState::Subscribed);
        // Each failed join waited the configured retry delay.
        assert_eq!(sup.delay.waits_ms, vec![2000, 2000]);
    }

    #[test]
    fn bring_up_subscribes_the_fixed_topic() {
        let mut sup = supervisor(FlakyRadio::failing(0), FakeBroker::default());
        futures::executor::block_on(sup.bring_up(&NET, &broker_config())).unwrap();

        assert_eq!(sup.session.subscribes, vec!["sonos/current_track"]);
        // Client id was generated with the configured prefix.
        assert!(sup.session.connects[0].starts_with("trackpanel-"));
    }

    #[test]
    fn broker_failure_is_fatal_and_stops_the_machine() {
        let session = FakeBroker {
            fail_connect: true,
            ..FakeBroker::default()
        };
        let mut sup = supervisor(FlakyRadio::failing(0), session);
        let err = futures::executor::block_on(sup.bring_up(&NET, &broker_config()));

        assert!(matches!(err, Err(SupervisorError::Connect(StepFailed))));
        assert_eq!(sup.state(), ConnectionState::BrokerConnecting);
        // The broker step was attempted exactly once; no retry loop.
        assert_eq!(sup.session.connects.len(), 1);
    }

    #[test]
    fn subscribe_failure_is_fatal() {
        let session = FakeBroker {
            fail_subscribe: true,
            ..FakeBroker::default()
        };
        let mut sup = supervisor(FlakyRadio::failing(0), session);
        let err = futures::executor::block_on(sup.bring_up(&NET, &broker_config()));

        assert!(matches!(err, Err(SupervisorError::Subscribe(StepFailed))));
        assert_eq!(sup.state(), ConnectionState::BrokerConnected);
    }

    #[test]
    fn reset_after_fatal_keeps_the_radio_association() {
        let mut sup = supervisor(FlakyRadio::failing(0), FakeBroker::default());
        futures::executor::block_on(sup.bring_up(&NET, &broker_config())).unwrap();

        sup.reset_session();
        assert_eq!(sup.state(), ConnectionState::RadioJoined);

        // The next cycle skips the join and generates a fresh client id.
        futures::executor::block_on(sup.bring_up(&NET, &broker_config())).unwrap();
        assert_eq!(sup.radio().attempts, 1);
        assert_eq!(sup.session.connects.len(), 2);
        assert_eq!(sup.state(), ConnectionState::Subscribed);
    }

    #[test]
    fn heartbeat_cadence_over_95_units_fires_three_times() {
        let start = Instant::from_secs(0);
        let mut beat = Heartbeat::new(start, Duration::from_secs(30));

        let mut fires = 0;
        for t in 0..=95u64 {
            if beat.due(Instant::from_secs(t)) {
                fires += 1;
            }
        }
        assert_eq!(fires, 3);
    }

    #[test]
    fn heartbeat_deadline_advances_from_schedule_not_observation() {
        let mut beat = Heartbeat::new(Instant::from_secs(0), Duration::from_secs(30));
        // Observed late: the next deadline still lands on the grid.
        assert!(beat.due(Instant::from_secs(42)));
        assert_eq!(beat.deadline(), Instant::from_secs(60));
    }
}
