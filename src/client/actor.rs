use super::fetch::ImageFetcher;
use super::transport::{self, ControlStream};
use crate::errors::{OriginError, OriginResult};
use crate::session::{Effect, Event, ImageContext, ImageRequest, Session};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};

pub(super) type SessionJob = Box<dyn FnOnce(&mut Session) + Send>;

pub(super) enum Request {
    Connect {
        host: String,
        port: u16,
        reply: oneshot::Sender<OriginResult>,
    },
    Disconnect,
    WithSession(SessionJob),
}

/// Completions of work the actor started in the background.
pub(super) enum Completion {
    Connected(OriginResult<ControlStream>),
    Downloaded(ImageContext, OriginResult<Bytes>),
}

pub(super) struct Actor {
    session: Session,
    fetcher: Arc<dyn ImageFetcher>,
    events: broadcast::Sender<Event>,
    socket: Option<ControlStream>,
    status_timer: Option<Interval>,
    ping_timer: Option<Interval>,
    pending_connect: Option<oneshot::Sender<OriginResult>>,
    completions: mpsc::UnboundedSender<Completion>,
}

async fn next_frame(
    socket: &mut Option<ControlStream>,
) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => std::future::pending().await,
    }
}

async fn tick(timer: &mut Option<Interval>) -> std::time::Instant {
    match timer {
        Some(timer) => timer.tick().await.into_std(),
        None => std::future::pending().await,
    }
}

fn start_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

impl Actor {
    pub(super) fn new(
        session: Session,
        fetcher: Arc<dyn ImageFetcher>,
        events: broadcast::Sender<Event>,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, completions_rx) = mpsc::unbounded_channel();
        let actor = Self {
            session,
            fetcher,
            events,
            socket: None,
            status_timer: None,
            ping_timer: None,
            pending_connect: None,
            completions,
        };
        (actor, completions_rx)
    }

    /// Serve requests until every client handle is dropped.
    pub(super) async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion),
                frame = next_frame(&mut self.socket) => self.handle_frame(frame),
                _ = tick(&mut self.status_timer) => self.session.on_status_tick(),
                now = tick(&mut self.ping_timer) => self.session.on_ping_tick(now),
            }
            self.apply_effects().await;
        }

        tracing::debug!("All client handles dropped, shutting down session");
        self.session.disconnect();
        self.apply_effects().await;
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Connect { host, port, reply } => self.connect(&host, port, reply),
            Request::Disconnect => {
                if let Some(reply) = self.pending_connect.take() {
                    let _ = reply.send(Err(OriginError::NotConnected));
                }
                self.session.disconnect();
            }
            Request::WithSession(job) => job(&mut self.session),
        }
    }

    fn connect(&mut self, host: &str, port: u16, reply: oneshot::Sender<OriginResult>) {
        if self.pending_connect.is_some() {
            let _ = reply.send(Err(OriginError::ConnectInProgress));
            return;
        }
        // A new connect replaces the current link.
        self.session.disconnect();

        let url = self.session.begin_connect(host, port);
        let timeout = self.session.config().connect_timeout;
        self.pending_connect = Some(reply);
        let completions = self.completions.clone();
        drop(tokio::spawn(async move {
            let result = transport::open(&url, timeout).await;
            let _ = completions.send(Completion::Connected(result));
        }));
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Connected(result) => {
                let Some(reply) = self.pending_connect.take() else {
                    tracing::debug!("Dropping control channel of a cancelled connect");
                    return;
                };
                let outcome = match result {
                    Ok(socket) => {
                        self.socket = Some(socket);
                        self.session.on_connected();
                        Ok(())
                    }
                    Err(err) => {
                        self.session.on_transport_error(&err);
                        Err(err)
                    }
                };
                let _ = reply.send(outcome);
            }
            Completion::Downloaded(context, result) => {
                self.session.on_download_complete(context, result);
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => self.session.on_text(text.as_str()),
            Some(Ok(Message::Pong(_))) => self.session.on_pong(std::time::Instant::now()),
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(?frame, "Control channel closed by telescope");
                self.drop_link();
            }
            Some(Ok(Message::Binary(data))) => {
                tracing::trace!(len = data.len(), "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
            Some(Err(err)) => self.link_failed(err.into()),
            None => self.drop_link(),
        }
    }

    fn link_failed(&mut self, err: OriginError) {
        self.session.on_transport_error(&err);
        self.drop_link();
    }

    fn drop_link(&mut self) {
        self.socket = None;
        self.session.on_disconnected();
    }

    async fn apply_effects(&mut self) {
        loop {
            let effects = self.session.take_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                self.apply(effect).await;
            }
        }
    }

    async fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Send(text) => self.write(Message::Text(text.into())).await,
            Effect::Ping => self.write(Message::Ping(Bytes::new())).await,
            Effect::Fetch(request) => self.fetch(request),
            Effect::Close => {
                if let Some(mut socket) = self.socket.take() {
                    if let Err(err) = socket.close(None).await {
                        tracing::debug!(%err, "Error while closing control channel");
                    }
                }
            }
            Effect::StartTimers => {
                let config = self.session.config();
                self.status_timer = Some(start_timer(config.status_interval));
                self.ping_timer = Some(start_timer(config.ping_interval));
            }
            Effect::StopTimers => {
                self.status_timer = None;
                self.ping_timer = None;
            }
            Effect::Emit(event) => {
                // Nobody listening is fine.
                let _ = self.events.send(event);
            }
        }
    }

    async fn write(&mut self, message: Message) {
        let Some(socket) = &mut self.socket else {
            tracing::warn!("Control channel is gone, dropping outbound frame");
            return;
        };
        if let Err(err) = socket.send(message).await {
            self.link_failed(err.into());
        }
    }

    fn fetch(&self, request: ImageRequest) {
        let fetcher = Arc::clone(&self.fetcher);
        let completions = self.completions.clone();
        drop(tokio::spawn(async move {
            let ImageRequest { url, context } = request;
            let result = fetcher.fetch(&url).await;
            let _ = completions.send(Completion::Downloaded(context, result));
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::HttpImageFetcher;
    use crate::config::OriginConfig;

    fn actor() -> Actor {
        let (events, _) = broadcast::channel(16);
        let (actor, _completions) = Actor::new(
            Session::new(OriginConfig::default()),
            Arc::new(HttpImageFetcher::default()),
            events,
        );
        actor
    }

    #[tokio::test]
    async fn timers_follow_session_effects() -> eyre::Result<()> {
        let mut actor = actor();
        actor.apply(Effect::StartTimers).await;
        assert!(actor.status_timer.is_some());
        assert!(actor.ping_timer.is_some());

        actor.apply(Effect::StopTimers).await;
        assert!(actor.status_timer.is_none());
        assert!(actor.ping_timer.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_link_stops_timers() -> eyre::Result<()> {
        let mut actor = actor();
        let _ = actor.session.begin_connect("origin.local", 80);
        actor.session.on_connected();
        actor.apply_effects().await;
        assert!(actor.status_timer.is_some());

        actor.handle_frame(None);
        actor.apply_effects().await;
        assert!(actor.status_timer.is_none());
        assert!(actor.ping_timer.is_none());
        assert!(!actor.session.status().is_connected);
        Ok(())
    }
}
