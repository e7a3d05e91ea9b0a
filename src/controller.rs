//! # Controller Loop
//!
//! Top-level orchestration: drive the supervisor to the subscribed state,
//! then service inbound messages (decode → layout → render) interleaved with
//! keep-alive deadlines on a single logical thread. Message-local failures
//! drop that message only; fatal-class failures pause and then follow the
//! configured [`FatalPolicy`].

use embassy_futures::select::{Either, select};
use embassy_time::{Instant, Timer};
use embedded_hal_async::delay::DelayNs;
use rand_core::RngCore;

use crate::config::{BrokerConfig, NetworkConfig};
use crate::error::{FailureClass, SupervisorError};
use crate::fmt::Debug2Format;
use crate::link::Radio;
use crate::render::{Surface, TrackRenderer};
use crate::session::Broker;
use crate::supervisor::{Heartbeat, Supervisor};
use crate::track;

/// What to do after a fatal-class failure.
///
/// The reference device only logged and stalled, which leaves a single
/// broker misconfiguration fatal forever; restarting the session from the
/// joined radio is the default here, with the stall behavior kept available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalPolicy {
    /// Re-run the supervisor from `RadioJoined` after the failure delay.
    #[default]
    RestartSession,
    /// Log, then park; recovery requires a restart.
    Halt,
}

/// Orchestrates connectivity, decoding, and rendering.
pub struct Controller<'a, R, B, D, G, S> {
    supervisor: Supervisor<R, B, D, G>,
    renderer: TrackRenderer<S, D>,
    delay: D,
    net: NetworkConfig<'a>,
    broker: BrokerConfig<'a>,
    policy: FatalPolicy,
}

impl<'a, R, B, D, G, S> Controller<'a, R, B, D, G, S>
where
    R: Radio,
    B: Broker,
    D: DelayNs,
    G: RngCore,
    S: Surface,
{
    pub fn new(
        supervisor: Supervisor<R, B, D, G>,
        renderer: TrackRenderer<S, D>,
        delay: D,
        net: NetworkConfig<'a>,
        broker: BrokerConfig<'a>,
        policy: FatalPolicy,
    ) -> Self {
        Self {
            supervisor,
            renderer,
            delay,
            net,
            broker,
            policy,
        }
    }

    /// Run forever: bring the session up, service it until it dies, apply
    /// the fatal policy, repeat.
    pub async fn run(&mut self) -> ! {
        loop {
            let Err(e) = self.session_cycle().await else {
                continue;
            };
            if e.class() == FailureClass::Transient {
                warn!("transient failure, retrying: {:?}", Debug2Format(&e));
                continue;
            }

            error!("session failed: {:?}", Debug2Format(&e));
            self.delay
                .delay_ms(self.supervisor.config().fail_delay_ms)
                .await;
            match self.policy {
                FatalPolicy::RestartSession => {
                    info!("restarting session");
                    self.supervisor.reset_session();
                }
                FatalPolicy::Halt => {
                    warn!("halted; power-cycle to recover");
                    loop {
                        self.delay.delay_ms(60_000).await;
                    }
                }
            }
        }
    }

    async fn session_cycle(&mut self) -> Result<(), SupervisorError<R::Error, B::Error>> {
        self.supervisor.bring_up(&self.net, &self.broker).await?;
        self.serve().await
    }

    /// Service inbound messages and heartbeat deadlines. Returns only on a
    /// fatal-class failure.
    async fn serve(&mut self) -> Result<(), SupervisorError<R::Error, B::Error>> {
        let mut beat = Heartbeat::new(Instant::now(), self.supervisor.config().keep_alive);
        loop {
            let Self {
                supervisor,
                renderer,
                broker,
                ..
            } = self;

            match select(supervisor.session_mut().poll(), Timer::at(beat.deadline())).await {
                Either::First(Ok(msg)) => {
                    if msg.topic != broker.topic {
                        debug!("ignoring message on {}", msg.topic);
                        continue;
                    }
                    deliver(renderer, msg.payload).await;
                }
                Either::First(Err(e)) => {
                    error!("receive: {:?}", Debug2Format(&e));
                    return Err(SupervisorError::Receive(e));
                }
                Either::Second(()) => {
                    if beat.due(Instant::now()) {
                        supervisor.heartbeat().await?;
                    }
                }
            }
        }
    }
}

/// Decode one payload and render it. Message-local failures are logged and
/// the message dropped; connectivity and the displayed content are
/// unaffected.
pub(crate) async fn deliver<S: Surface, D: DelayNs>(
    renderer: &mut TrackRenderer<S, D>,
    payload: &[u8],
) {
    let track = match track::decode(payload) {
        Ok(t) => t,
        Err(e) => {
            warn!("decode: {:?}", Debug2Format(&e));
            return;
        }
    };

    info!("now playing: {} - {}", track.artist, track.title);
    if let Err(e) = renderer.render(&track).await {
        warn!("render: {:?}", Debug2Format(&e));
    }
}
