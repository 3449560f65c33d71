//! Command dispatcher — the single owner of the hardware link.
//!
//! A dedicated worker thread holds the [`HardwareLink`] and performs all
//! blocking I/O. Callers enqueue [`Command`]s onto one ordered queue, so the
//! board observes them exactly in submission order. Between commands the
//! worker polls the board for events on a fixed period and forwards them to
//! the control loop over an unbounded channel.
//!
//! Three submission flavours exist:
//! - [`Dispatcher::submit`]: fire-and-forget; failures are logged.
//! - [`Dispatcher::request`]: returns a future resolving to the reply, for
//!   the async control loop.
//! - [`Dispatcher::submit_sync`]: blocks the calling thread until the reply
//!   arrives; refused on the worker thread itself.

use std::future::Future;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use rocwire_domain::command::{Command, Reply};
use rocwire_domain::error::DispatchError;
use rocwire_domain::event::RawEvent;

use crate::ports::HardwareLink;

/// Poll period used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

type Outcome = Result<Reply, DispatchError>;

/// Where the worker sends a command's outcome.
enum Responder {
    /// Nobody waits; failures are logged.
    Detached,
    Async(oneshot::Sender<Outcome>),
    Blocking(std_mpsc::SyncSender<Outcome>),
}

impl Responder {
    fn respond(self, command: &Command, outcome: Outcome) {
        match self {
            Self::Detached => {
                if let Err(err) = outcome {
                    tracing::error!(command = command.name(), error = %err, "command failed");
                }
            }
            Self::Async(reply) => {
                let _ = reply.send(outcome);
            }
            Self::Blocking(reply) => {
                let _ = reply.send(outcome);
            }
        }
    }
}

enum Job {
    Run {
        command: Command,
        responder: Responder,
    },
    Shutdown,
}

/// Handle to the worker thread.
///
/// Dropping the dispatcher lets the worker finish every queued command,
/// then stops and joins it.
pub struct Dispatcher {
    jobs: std_mpsc::Sender<Job>,
    worker_id: ThreadId,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Move `link` onto a new worker thread.
    ///
    /// Returns the dispatcher and the stream of raw events the worker polls.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Link`] if the OS refuses to spawn the thread.
    pub fn spawn<L: HardwareLink>(
        link: L,
        poll_interval: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<RawEvent>), DispatchError> {
        let (jobs, queue) = std_mpsc::channel();
        let (events, inbound) = mpsc::unbounded_channel();
        let worker = thread::Builder::new()
            .name("rocwire-worker".into())
            .spawn(move || run(link, &queue, &events, poll_interval))
            .map_err(|err| DispatchError::Link(Box::new(err)))?;
        tracing::info!(?poll_interval, "dispatcher started");

        Ok((
            Self {
                jobs,
                worker_id: worker.thread().id(),
                worker: Some(worker),
            },
            inbound,
        ))
    }

    /// Enqueue a command without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::WorkerStopped`] if the worker is gone.
    pub fn submit(&self, command: Command) -> Result<(), DispatchError> {
        self.enqueue(command, Responder::Detached)
    }

    /// Enqueue a command and get a future for its reply.
    ///
    /// The command is queued before this returns, so ordering relative to
    /// other submissions is fixed at call time, not at `.await` time.
    pub fn request(
        &self,
        command: Command,
    ) -> impl Future<Output = Result<Reply, DispatchError>> + Send + 'static {
        let (reply, outcome) = oneshot::channel();
        let queued = self.enqueue(command, Responder::Async(reply));
        async move {
            queued?;
            outcome.await.map_err(|_| DispatchError::WorkerStopped)?
        }
    }

    /// Enqueue a command and block the calling thread until it ran.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::WouldDeadlock`] when called from the worker thread.
    /// - [`DispatchError::WorkerStopped`] if the worker is gone.
    /// - [`DispatchError::Link`] if the board failed the command.
    pub fn submit_sync(&self, command: Command) -> Result<Reply, DispatchError> {
        if thread::current().id() == self.worker_id {
            return Err(DispatchError::WouldDeadlock);
        }
        let (reply, outcome) = std_mpsc::sync_channel(1);
        self.enqueue(command, Responder::Blocking(reply))?;
        outcome.recv().map_err(|_| DispatchError::WorkerStopped)?
    }

    fn enqueue(&self, command: Command, responder: Responder) -> Result<(), DispatchError> {
        self.jobs
            .send(Job::Run { command, responder })
            .map_err(|_| DispatchError::WorkerStopped)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.jobs.send(Job::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("dispatcher worker panicked");
        }
        tracing::info!("dispatcher stopped");
    }
}

fn run<L: HardwareLink>(
    mut link: L,
    queue: &std_mpsc::Receiver<Job>,
    events: &mpsc::UnboundedSender<RawEvent>,
    poll_interval: Duration,
) {
    let mut next_poll = Instant::now() + poll_interval;
    loop {
        let timeout = next_poll.saturating_duration_since(Instant::now());
        match queue.recv_timeout(timeout) {
            Ok(Job::Run { command, responder }) => {
                let outcome = execute(&mut link, &command);
                responder.respond(&command, outcome);
            }
            Ok(Job::Shutdown) | Err(std_mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {}
        }

        if Instant::now() >= next_poll {
            poll(&mut link, events);
            next_poll = Instant::now() + poll_interval;
        }
    }
}

fn execute<L: HardwareLink>(link: &mut L, command: &Command) -> Outcome {
    tracing::debug!(command = command.name(), "executing");
    if let Command::Sync(token) = command {
        return Ok(Reply::Sync(*token));
    }
    link.execute(command).map_err(DispatchError::Link)
}

fn poll<L: HardwareLink>(link: &mut L, events: &mpsc::UnboundedSender<RawEvent>) {
    match link.poll_events() {
        Ok(batch) => {
            for event in batch {
                if events.send(event).is_err() {
                    break;
                }
            }
        }
        Err(err) => tracing::warn!(error = %err, "event poll failed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rocwire_domain::command::Module;
    use rocwire_domain::event::EventType;
    use rocwire_domain::id::DriverNumber;

    use super::*;
    use crate::ports::LinkError;

    #[derive(Default, Clone)]
    struct RecordingLink {
        log: Arc<Mutex<Vec<Command>>>,
        pending: Arc<Mutex<Vec<RawEvent>>>,
        fail_reads: bool,
    }

    impl HardwareLink for RecordingLink {
        fn execute(&mut self, command: &Command) -> Result<Reply, LinkError> {
            self.log.lock().unwrap().push(command.clone());
            match command {
                Command::ReadData { .. } if self.fail_reads => {
                    Err(std::io::Error::other("usb stalled").into())
                }
                Command::ReadData { address, .. } => Ok(Reply::Data(u32::from(*address))),
                _ => Ok(Reply::Done),
            }
        }

        fn poll_events(&mut self) -> Result<Vec<RawEvent>, LinkError> {
            Ok(std::mem::take(&mut *self.pending.lock().unwrap()))
        }
    }

    fn pulse(driver: u16) -> Command {
        Command::DriverPulse {
            driver: DriverNumber::new(driver),
            milliseconds: 10,
        }
    }

    #[test]
    fn should_deliver_commands_in_submission_order() {
        let link = RecordingLink::default();
        let log = Arc::clone(&link.log);
        let (dispatcher, _events) = Dispatcher::spawn(link, DEFAULT_POLL_INTERVAL).unwrap();

        for driver in 0..20 {
            dispatcher.submit(pulse(driver)).unwrap();
        }
        assert_eq!(dispatcher.submit_sync(Command::Sync(7)).unwrap(), Reply::Sync(7));

        let expected: Vec<_> = (0..20).map(pulse).collect();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    #[test]
    fn should_answer_sync_without_touching_the_link() {
        let link = RecordingLink::default();
        let log = Arc::clone(&link.log);
        let (dispatcher, _events) = Dispatcher::spawn(link, DEFAULT_POLL_INTERVAL).unwrap();

        assert_eq!(dispatcher.submit_sync(Command::Sync(1)).unwrap(), Reply::Sync(1));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn should_return_board_reply_when_submitting_sync() {
        let (dispatcher, _events) =
            Dispatcher::spawn(RecordingLink::default(), DEFAULT_POLL_INTERVAL).unwrap();
        let reply = dispatcher
            .submit_sync(Command::ReadData {
                module: Module::Manager,
                address: 0x03,
            })
            .unwrap();
        assert_eq!(reply, Reply::Data(3));
    }

    #[test]
    fn should_report_link_failure_to_submitter() {
        let link = RecordingLink {
            fail_reads: true,
            ..RecordingLink::default()
        };
        let log = Arc::clone(&link.log);
        let (dispatcher, _events) = Dispatcher::spawn(link, DEFAULT_POLL_INTERVAL).unwrap();

        let err = dispatcher
            .submit_sync(Command::ReadData {
                module: Module::Manager,
                address: 0x01,
            })
            .unwrap_err();
        assert!(matches!(err, DispatchError::Link(_)));
        assert_eq!(log.lock().unwrap().len(), 1, "failed command is not retried");
    }

    #[test]
    fn should_keep_running_after_fire_and_forget_failure() {
        let link = RecordingLink {
            fail_reads: true,
            ..RecordingLink::default()
        };
        let (dispatcher, _events) = Dispatcher::spawn(link, DEFAULT_POLL_INTERVAL).unwrap();

        dispatcher
            .submit(Command::ReadData {
                module: Module::Manager,
                address: 0x01,
            })
            .unwrap();
        assert_eq!(dispatcher.submit_sync(Command::Sync(2)).unwrap(), Reply::Sync(2));
    }

    #[tokio::test]
    async fn should_resolve_request_future_with_reply() {
        let (dispatcher, _events) =
            Dispatcher::spawn(RecordingLink::default(), DEFAULT_POLL_INTERVAL).unwrap();
        let reply = dispatcher.request(Command::Sync(9)).await.unwrap();
        assert_eq!(reply, Reply::Sync(9));
    }

    #[tokio::test]
    async fn should_forward_polled_events_in_order() {
        let link = RecordingLink::default();
        link.pending.lock().unwrap().extend([
            RawEvent::new(EventType::SwitchClosedDebounced, 23),
            RawEvent::new(EventType::SwitchOpenDebounced, 23),
        ]);
        let (_dispatcher, mut events) = Dispatcher::spawn(link, DEFAULT_POLL_INTERVAL).unwrap();

        let first = events.recv().await.unwrap();
        let second = events.recv().await.unwrap();
        assert_eq!(first.event_type(), Some(EventType::SwitchClosedDebounced));
        assert_eq!(second.event_type(), Some(EventType::SwitchOpenDebounced));
    }

    #[test]
    fn should_refuse_sync_submission_from_worker_thread() {
        struct ReentrantLink {
            dispatcher: Arc<Mutex<Option<Arc<Dispatcher>>>>,
            outcome: Arc<Mutex<Option<DispatchError>>>,
        }

        impl HardwareLink for ReentrantLink {
            fn execute(&mut self, _command: &Command) -> Result<Reply, LinkError> {
                let dispatcher = self.dispatcher.lock().unwrap().clone();
                if let Some(dispatcher) = dispatcher {
                    let err = dispatcher.submit_sync(Command::Sync(0)).unwrap_err();
                    *self.outcome.lock().unwrap() = Some(err);
                }
                Ok(Reply::Done)
            }

            fn poll_events(&mut self) -> Result<Vec<RawEvent>, LinkError> {
                Ok(Vec::new())
            }
        }

        let slot = Arc::new(Mutex::new(None));
        let outcome = Arc::new(Mutex::new(None));
        let link = ReentrantLink {
            dispatcher: Arc::clone(&slot),
            outcome: Arc::clone(&outcome),
        };
        let (dispatcher, _events) = Dispatcher::spawn(link, DEFAULT_POLL_INTERVAL).unwrap();
        let dispatcher = Arc::new(dispatcher);
        *slot.lock().unwrap() = Some(Arc::clone(&dispatcher));

        dispatcher.submit_sync(pulse(1)).unwrap();
        assert!(matches!(
            outcome.lock().unwrap().take(),
            Some(DispatchError::WouldDeadlock)
        ));

        // Break the cycle so the worker can be joined.
        slot.lock().unwrap().take();
    }
}
