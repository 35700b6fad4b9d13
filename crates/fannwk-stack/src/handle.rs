//! The public, cloneable entry point.
//!
//! [`NetworkLayer::spawn`] moves the layer into its own task. Every other
//! context talks to it through a [`NetworkLayerHandle`], which only posts
//! messages; the task processes them strictly in arrival order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use fannwk_models::Port;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::RequestError;
use crate::layer::NetworkLayer;
use crate::mac::{MacConfirm, MacIndication};
use crate::request::{
    AttributeId, AttributeValue, Confirm, ConfirmSink, DataRequest, PortHandler, Request,
    ResetKind,
};

/// Everything the processing task consumes.
enum Message {
    Request {
        handle: u16,
        request: Request,
        sink: ConfirmSink,
    },
    MacIndication(MacIndication),
    MacConfirm(MacConfirm),
    RegisterPort {
        port: Port,
        handler: Box<dyn PortHandler>,
        reply: oneshot::Sender<Result<(), RequestError>>,
    },
}

impl NetworkLayer {
    /// Run the layer on its own task.
    ///
    /// The task ends when every handle has been dropped.
    pub fn spawn(self) -> (NetworkLayerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = NetworkLayerHandle {
            tx,
            next_handle: Arc::new(AtomicU16::new(1)),
            request_timeout: self.runtime().request_timeout,
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        let sweep_interval = self.runtime().sweep_interval;
        info!(?sweep_interval, "network layer running");
        let mut watchdog = tokio::time::interval(sweep_interval);

        loop {
            tokio::select! {
                maybe_message = rx.recv() => {
                    let Some(message) = maybe_message else {
                        break;
                    };
                    self.dispatch(message);
                }
                _ = watchdog.tick() => {
                    self.sweep(Instant::now());
                }
            }
        }
        info!("network layer stopped: all handles dropped");
    }

    fn dispatch(&mut self, message: Message) {
        match message {
            Message::Request {
                handle,
                request,
                sink,
            } => self.handle_request(handle, request, sink),
            Message::MacIndication(indication) => self.handle_mac_indication(indication),
            Message::MacConfirm(confirm) => self.handle_mac_confirm(confirm),
            Message::RegisterPort {
                port,
                handler,
                reply,
            } => {
                let _ = reply.send(self.register_port_handler(port, handler));
            }
        }
    }
}

/// Cloneable handle to a running [`NetworkLayer`].
#[derive(Clone)]
pub struct NetworkLayerHandle {
    tx: mpsc::UnboundedSender<Message>,
    next_handle: Arc<AtomicU16>,
    request_timeout: Duration,
}

impl NetworkLayerHandle {
    /// Move to `Operational`.
    pub async fn start(&self) -> Result<(), RequestError> {
        self.call(Request::Start).await?.status()
    }

    /// Move to `Idle`, purging any in-flight data request.
    pub async fn stop(&self) -> Result<(), RequestError> {
        self.call(Request::Stop).await?.status()
    }

    /// Clear statistics, and with [`ResetKind::All`] also the configuration.
    pub async fn reset(&self, kind: ResetKind) -> Result<(), RequestError> {
        self.call(Request::Reset(kind)).await?.status()
    }

    /// Read an attribute.
    pub async fn get(&self, id: AttributeId) -> Result<AttributeValue, RequestError> {
        match self.call(Request::Get(id)).await? {
            Confirm::Get { result, .. } => result,
            _ => Err(RequestError::ServiceUnavailable),
        }
    }

    /// Write an attribute.
    pub async fn set(&self, value: AttributeValue) -> Result<(), RequestError> {
        self.call(Request::Set(value)).await?.status()
    }

    /// Queue a data request; its confirm goes to `sink`.
    ///
    /// Returns the request handle carried by the confirm.
    pub fn data_request(
        &self,
        request: DataRequest,
        sink: ConfirmSink,
    ) -> Result<u16, RequestError> {
        let handle = self.allocate_handle();
        self.post(Message::Request {
            handle,
            request: Request::Data(request),
            sink,
        })?;
        Ok(handle)
    }

    /// Queue a data request and wait for its confirm.
    ///
    /// Not bounded by the request timeout: the layer's MAC confirm watchdog
    /// guarantees an answer.
    pub async fn send_data(&self, request: DataRequest) -> Result<(), RequestError> {
        let (tx, rx) = oneshot::channel();
        let handle = self.data_request(request, ConfirmSink::Reply(tx))?;
        match rx.await {
            Ok(confirm) => confirm.status(),
            Err(_) => {
                debug!(handle, "data request discarded before confirm");
                Err(RequestError::ServiceUnavailable)
            }
        }
    }

    /// Install the indication handler for `port`.
    pub async fn register_port_handler(
        &self,
        port: Port,
        handler: impl PortHandler + 'static,
    ) -> Result<(), RequestError> {
        let (reply, rx) = oneshot::channel();
        self.post(Message::RegisterPort {
            port,
            handler: Box::new(handler),
            reply,
        })?;
        rx.await.map_err(|_| RequestError::ServiceUnavailable)?
    }

    /// Post a frame received by the MAC.
    pub fn mac_indication(&self, indication: MacIndication) -> Result<(), RequestError> {
        self.post(Message::MacIndication(indication))
    }

    /// Post a MAC transmit outcome.
    pub fn mac_confirm(&self, confirm: MacConfirm) -> Result<(), RequestError> {
        self.post(Message::MacConfirm(confirm))
    }

    async fn call(&self, request: Request) -> Result<Confirm, RequestError> {
        let handle = self.allocate_handle();
        let (tx, rx) = oneshot::channel();
        self.post(Message::Request {
            handle,
            request,
            sink: ConfirmSink::Reply(tx),
        })?;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(confirm)) => Ok(confirm),
            Ok(Err(_)) => Err(RequestError::ServiceUnavailable),
            Err(_) => {
                debug!(handle, timeout = ?self.request_timeout, "request timed out");
                Err(RequestError::ServiceUnavailable)
            }
        }
    }

    fn allocate_handle(&self) -> u16 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    fn post(&self, message: Message) -> Result<(), RequestError> {
        self.tx
            .send(message)
            .map_err(|_| RequestError::ServiceUnavailable)
    }
}

impl std::fmt::Debug for NetworkLayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkLayerHandle")
            .field("request_timeout", &self.request_timeout)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
