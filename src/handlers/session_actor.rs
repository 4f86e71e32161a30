use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use crate::handlers::events::Command;
use crate::handlers::navigation_session::NavigationSession;
use crate::handlers::websocket_actor::AutoCancelTask;
use crate::models::error::LocatorError;
use crate::models::hospital::HospitalCandidate;
use crate::models::position::Position;
use crate::models::traffic::TrafficEstimate;
use crate::models::updates::{ClientInput, Outbound, UiIntent};
use crate::services::directory::HospitalRanker;
use crate::services::geolocation::{GeoFixAcquirer, GeolocationProvider};
use crate::services::traffic::TrafficAdvisor;

/// Shared, stateless collaborators handed to every session.
#[derive(Clone)]
pub struct SessionServices {
    pub ranker: Arc<HospitalRanker>,
    pub advisor: Option<Arc<TrafficAdvisor>>,
    /// Minimum time the loading screen stays up.
    pub loading_min: Duration,
}

enum TaskResult {
    Fix(Result<Position, LocatorError>),
    Hospitals(Result<Vec<HospitalCandidate>, LocatorError>),
    Traffic { hospital_id: String, estimate: Option<TrafficEstimate> },
}

/// Runs one navigation session: every client input, live fix and fetch result
/// is applied to the session one at a time.
pub struct SessionActor {
    inbound: mpsc::Receiver<ClientInput>,
    outbound: mpsc::UnboundedSender<Outbound>,
    positions: mpsc::Receiver<Position>,
    results_tx: mpsc::Sender<TaskResult>,
    results: mpsc::Receiver<TaskResult>,
    session: NavigationSession,
    acquirer: GeoFixAcquirer,
    services: SessionServices,
    fix_in_flight: bool,
    first_fix: Option<oneshot::Sender<()>>,
    tasks: Vec<AutoCancelTask<()>>,
}

impl SessionActor {
    pub fn new(inbound: mpsc::Receiver<ClientInput>,
               outbound: mpsc::UnboundedSender<Outbound>,
               provider: Arc<dyn GeolocationProvider>,
               services: SessionServices) -> Self {
        let (feed, positions) = mpsc::channel(64);
        let (results_tx, results) = mpsc::channel(16);
        let acquirer = GeoFixAcquirer::new(provider);

        Self {
            inbound,
            outbound,
            positions,
            results_tx,
            results,
            session: NavigationSession::new(acquirer.clone(), feed),
            acquirer,
            services,
            fix_in_flight: false,
            first_fix: None,
            tasks: Vec::new(),
        }
    }

    pub async fn run_actor(mut self) {
        enum Message {
            Client(ClientInput),
            Position(Position),
            Result(TaskResult),
        }

        let (first_fix_tx, first_fix_rx) = oneshot::channel();
        self.first_fix = Some(first_fix_tx);
        self.spawn(hide_loading_when_ready(self.services.loading_min, first_fix_rx, self.outbound.clone()));

        let commands = self.session.begin();
        self.execute(commands);

        loop {
            let message = select! {
                message = self.inbound.recv() => message.map(Message::Client),
                Some(position) = self.positions.recv() => Some(Message::Position(position)),
                Some(result) = self.results.recv() => Some(Message::Result(result)),
            };

            match message {
                Some(message) => {
                    let commands = match message {
                        Message::Client(input) => self.handle_input(input),
                        Message::Position(position) => self.session.apply_position(position),
                        Message::Result(result) => self.handle_result(result),
                    };
                    self.execute(commands);
                }
                None => {
                    info!("Client channel closed");
                    break;
                }
            }
        }

        self.session.stop_tracking();
        info!("Session ended in state {}", self.session.status());
    }

    fn handle_input(&mut self, input: ClientInput) -> Vec<Command> {
        debug!("Client input: {:?}", input);
        let result = match input {
            ClientInput::SelectCandidate(index) => self.session.select_candidate(index),
            ClientInput::RouteToNearest => self.session.route_to_nearest(),
            ClientInput::StartTracking(index) => self.session.start_tracking(index),
            ClientInput::ToggleTracking => Ok(self.session.toggle_tracking()),
            ClientInput::Recenter => Ok(self.session.recenter()),
            ClientInput::ChangeDestination => Ok(self.session.change_destination()),
            ClientInput::RetryLocation => Ok(self.session.retry_location()),
            ClientInput::RouteComputed { instructions } => Ok(self
                .session
                .on_route_computed(instructions.into_iter().map(|step| step.text).collect())),
            ClientInput::RouteFailed(reason) => Ok(self.session.on_route_failed(&reason)),
            ClientInput::PositionFix(_) | ClientInput::PositionFailed(_) | ClientInput::WatchUpdate { .. } => {
                debug!("Geolocation report reached the session actor, ignoring");
                Ok(vec![])
            }
        };

        result.unwrap_or_else(|e| {
            warn!("Rejected client input: {}", e);
            vec![Command::Ui(UiIntent::ShowError(e.to_string()))]
        })
    }

    fn handle_result(&mut self, result: TaskResult) -> Vec<Command> {
        match result {
            TaskResult::Fix(fix) => {
                self.fix_in_flight = false;
                if let Some(first_fix) = self.first_fix.take() {
                    first_fix.send(()).ok();
                }
                self.session.on_fix(fix)
            }
            TaskResult::Hospitals(hospitals) => self.session.on_hospitals(hospitals),
            TaskResult::Traffic { hospital_id, estimate } => self.session.on_traffic(&hospital_id, estimate),
        }
    }

    fn execute(&mut self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Map(intent) => self.send(Outbound::Map(intent)),
                Command::Ui(intent) => self.send(Outbound::Ui(intent)),
                Command::Transition(status) => {
                    debug!("Session is now {}", status);
                    self.send(Outbound::Transition(status));
                }
                Command::AcquireFix => {
                    if self.fix_in_flight {
                        debug!("Position request still outstanding, waiting for it");
                        continue;
                    }
                    self.fix_in_flight = true;
                    let acquirer = self.acquirer.clone();
                    let results = self.results_tx.clone();
                    self.spawn(async move {
                        let fix = acquirer.acquire_once().await;
                        results.send(TaskResult::Fix(fix)).await.ok();
                    });
                }
                Command::FetchHospitals(origin) => {
                    let ranker = self.services.ranker.clone();
                    let results = self.results_tx.clone();
                    self.spawn(async move {
                        let hospitals = ranker.find(origin).await;
                        results.send(TaskResult::Hospitals(hospitals)).await.ok();
                    });
                }
                Command::EstimateTraffic { hospital_id, position } => match self.services.advisor.clone() {
                    Some(advisor) => {
                        let results = self.results_tx.clone();
                        self.spawn(async move {
                            let estimate = advisor.estimate_congestion(position).await;
                            results.send(TaskResult::Traffic { hospital_id, estimate }).await.ok();
                        });
                    }
                    None => debug!("Traffic advisor disabled, no estimate for {}", hospital_id),
                },
            }
        }
    }

    fn send(&self, message: Outbound) {
        if self.outbound.send(message).is_err() {
            debug!("Client gone, dropping outbound message");
        }
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|task| !task.0.is_finished());
        self.tasks.push(AutoCancelTask(tokio::spawn(task)));
    }
}

/// Hides the loading screen once the minimum time passed and the first fix settled.
async fn hide_loading_when_ready(min: Duration,
                                 first_fix: oneshot::Receiver<()>,
                                 outbound: mpsc::UnboundedSender<Outbound>) {
    let (_, settled) = tokio::join!(tokio::time::sleep(min), first_fix);
    if settled.is_ok() {
        outbound.send(Outbound::Ui(UiIntent::HideLoading)).ok();
    }
}
