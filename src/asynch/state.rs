use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;

/// Consecutive failed heartbeats before the link is reported down
pub const HEARTBEAT_FAILURE_LIMIT: u8 = 3;

/// The link state of the modem: up while it answers `AT`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Down,
    Up,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationState {
    #[default]
    NotRegistered = 0,
    Registering = 1,
    Registered = 2,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Subscribed = 3,
}

/// Move `current` forward to `next`. Backward moves are refused and
/// `false` is returned.
pub fn advance<S: Ord + Copy>(current: &mut S, next: S) -> bool {
    if next < *current {
        return false;
    }
    *current = next;
    true
}

pub struct State {
    shared: Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                link_state: LinkState::Down,
                registration_state: RegistrationState::NotRegistered,
                mqtt_state: MqttState::Disconnected,
                heartbeat_failures: 0,
                state_waker: WakerRegistration::new(),
            })),
        }
    }
}

pub struct Shared {
    link_state: LinkState,
    registration_state: RegistrationState,
    mqtt_state: MqttState,
    heartbeat_failures: u8,
    state_waker: WakerRegistration,
}

/// Handle to the device state shared between tasks.
#[derive(Clone, Copy)]
pub struct Runner<'d> {
    pub(crate) shared: &'d Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl<'d> Runner<'d> {
    pub fn new(state: &'d State) -> Self {
        Self {
            shared: &state.shared,
        }
    }

    pub fn set_link_state(&self, state: LinkState) {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            if s.link_state != state {
                info!("Link state changed to {:?}", state);
            }
            s.link_state = state;
            s.state_waker.wake();
        });
    }

    pub fn link_state(&self, cx: Option<&mut Context>) -> LinkState {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            if let Some(cx) = cx {
                s.state_waker.register(cx.waker());
            }
            s.link_state
        })
    }

    /// Forward-only; returns `false` when `state` would move backwards.
    pub fn set_registration_state(&self, state: RegistrationState) -> bool {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            let moved = advance(&mut s.registration_state, state);
            if moved {
                s.state_waker.wake();
            }
            moved
        })
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.shared.lock(|s| s.borrow().registration_state)
    }

    /// Forward-only; returns `false` when `state` would move backwards.
    pub fn set_mqtt_state(&self, state: MqttState) -> bool {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            let moved = advance(&mut s.mqtt_state, state);
            if moved {
                s.state_waker.wake();
            }
            moved
        })
    }

    pub fn mqtt_state(&self, cx: Option<&mut Context>) -> MqttState {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            if let Some(cx) = cx {
                s.state_waker.register(cx.waker());
            }
            s.mqtt_state
        })
    }

    /// Explicit failure-and-restart: drop both session states back to
    /// their initial values.
    pub fn reset(&self) {
        self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            s.registration_state = RegistrationState::NotRegistered;
            s.mqtt_state = MqttState::Disconnected;
            s.state_waker.wake();
        });
    }

    /// Count a heartbeat result. The link goes down after
    /// [`HEARTBEAT_FAILURE_LIMIT`] consecutive failures and back up on the
    /// next success.
    pub fn record_heartbeat(&self, alive: bool) -> LinkState {
        let state = self.shared.lock(|s| {
            let s = &mut *s.borrow_mut();
            if alive {
                s.heartbeat_failures = 0;
                LinkState::Up
            } else {
                s.heartbeat_failures = s.heartbeat_failures.saturating_add(1);
                if s.heartbeat_failures >= HEARTBEAT_FAILURE_LIMIT {
                    LinkState::Down
                } else {
                    s.link_state
                }
            }
        });
        self.set_link_state(state);
        state
    }

    pub fn heartbeat_failures(&self) -> u8 {
        self.shared.lock(|s| s.borrow().heartbeat_failures)
    }

    /// Resolve once the MQTT session reached at least `ms`.
    pub async fn wait_for_mqtt_state(&self, ms: MqttState) {
        if self.mqtt_state(None) >= ms {
            return;
        }

        poll_fn(|cx| {
            if self.mqtt_state(Some(cx)) >= ms {
                return Poll::Ready(());
            }
            Poll::Pending
        })
        .await
    }
}
