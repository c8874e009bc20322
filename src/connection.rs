//! Connection record and the queued-pipeline scheduler: per-connection
//! request/response FIFOs, at-most-one-in-flight dispatch, connect and
//! disconnect, implicit connect, cancellation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use crate::engine;
use crate::error::Error;
use crate::netdriver;
use crate::request::{Request, RequestInner};
use crate::response::{Response, ResponseInner};
use crate::transport::{Connector, Credentials, ServerInfo, TaskPool,
                       Transport};
use crate::{DEFAULT_TIMEOUT_MS, MAX_ALPN_PROTOCOLS_LEN, MAX_HOST_NAME_LEN};

/// Where and how to connect one TLS stream.
#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    pub host: String,
    pub port: u16,
    /// Skip TLS: no credentials are passed to the transport.
    pub non_tls: bool,
    /// Ask the transport to suppress SNI.
    pub disable_sni: bool,
    /// Comma-separated ALPN protocol list, passed through verbatim.
    pub alpn_protocols: Option<String>,
    /// Per-receive wait in milliseconds; 0 selects the library default.
    pub timeout_ms: u64,
    pub root_ca: Option<Vec<u8>>,
    pub client_cert: Option<Vec<u8>>,
    pub private_key: Option<Vec<u8>>,
}

impl ConnectInfo {
    pub fn new(host: &str, port: u16) -> ConnectInfo {
        ConnectInfo {
            host: host.to_string(),
            port: port,
            ..Default::default()
        }
    }
    pub fn timeout_ms(mut self, value: u64) -> ConnectInfo {
        self.timeout_ms = value;
        self
    }
    pub fn non_tls(mut self) -> ConnectInfo {
        self.non_tls = true;
        self
    }
    pub fn disable_sni(mut self) -> ConnectInfo {
        self.disable_sni = true;
        self
    }
    pub fn alpn_protocols(mut self, protocols: &str) -> ConnectInfo {
        self.alpn_protocols = Some(protocols.to_string());
        self
    }
}

pub(crate) struct ConnInner {
    /// `None` once disconnected. Kept in an `Arc` so the dispatcher can use
    /// the stream without holding the slot locked.
    transport: Mutex<Option<Arc<dyn Transport>>>,
    req_q: Mutex<VecDeque<Arc<RequestInner>>>,
    resp_q: Mutex<VecDeque<Arc<ResponseInner>>>,
    connected: AtomicBool,
    /// A protocol or parse violation happened; tear down instead of reuse.
    fatal: AtomicBool,
    /// A send task is mid-flight; disconnect reports `Busy`.
    sending: AtomicBool,
    pool: Arc<dyn TaskPool>,
}

impl ConnInner {
    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().expect("transport slot poisoned").clone()
    }
    fn req_q(&self) -> MutexGuard<VecDeque<Arc<RequestInner>>> {
        self.req_q.lock().expect("request queue mutex poisoned")
    }
    fn resp_q(&self) -> MutexGuard<VecDeque<Arc<ResponseInner>>> {
        self.resp_q.lock().expect("response queue mutex poisoned")
    }
}

/// Handle to an established connection. Cheap to clone.
#[derive(Clone)]
pub struct HttpsConnection {
    pub(crate) inner: Arc<ConnInner>,
}

impl HttpsConnection {
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Tear down the transport and clear both queues. Every dropped request
    /// is released with an error so no waiter blocks forever. Reports
    /// `Busy` when a request was still sending.
    pub fn disconnect(&self) -> Result<(), Error> {
        let busy = self.inner.sending.load(Ordering::SeqCst);
        disconnect_and_clear(&self.inner, None);
        if busy { Err(Error::Busy) } else { Ok(()) }
    }
}

/// Entry point: owns the transport connector and the task pool
/// capabilities and builds connections from them.
pub struct HttpsClient {
    connector: Arc<dyn Connector>,
    pool: Arc<dyn TaskPool>,
}

impl HttpsClient {
    pub fn new(connector: Arc<dyn Connector>, pool: Arc<dyn TaskPool>)
        -> HttpsClient
    {
        HttpsClient {
            connector: connector,
            pool: pool,
        }
    }

    pub fn connect(&self, info: &ConnectInfo)
        -> Result<HttpsConnection, Error>
    {
        connect_inner(&self.connector, &self.pool, info)
            .map(|inner| HttpsConnection { inner: inner })
    }

    /// Submit and block on the completion signal. On expiry of `timeout`
    /// the request is cancelled and `Busy` returned.
    pub fn send_sync(&self, conn: &mut Option<HttpsConnection>,
        req: &Request, timeout: Option<Duration>)
        -> Result<Response, Error>
    {
        if req.inner.handlers.is_some() {
            return Err(Error::InvalidParameter);
        }
        self.submit(conn, req)?;
        let resp = req.response();
        match resp.inner.done.wait(timeout) {
            Some(Ok(())) => Ok(resp),
            Some(Err(e)) => Err(e),
            None => {
                debug!("synchronous wait expired; cancelling the request");
                resp.cancel();
                Err(Error::Busy)
            }
        }
    }

    /// Submit a callback-driven request; completion arrives through its
    /// handlers.
    pub fn send_async(&self, conn: &mut Option<HttpsConnection>,
        req: &Request)
        -> Result<Response, Error>
    {
        if req.inner.handlers.is_none() {
            return Err(Error::InvalidParameter);
        }
        self.submit(conn, req)?;
        Ok(req.response())
    }

    fn submit(&self, conn: &mut Option<HttpsConnection>, req: &Request)
        -> Result<(), Error>
    {
        let reusable = match *conn {
            Some(ref c) if c.is_connected() => Some(c.clone()),
            _ => None,
        };
        let connection = match reusable {
            Some(c) => c,
            None => {
                // implicit connect from the request's stored info
                let info = req.inner.connect_info.clone()
                    .ok_or(Error::InvalidParameter)?;
                let c = self.connect(&info)?;
                *conn = Some(c.clone());
                c
            }
        };
        submit_request(&connection.inner, &req.inner)
    }
}

fn connect_inner(connector: &Arc<dyn Connector>, pool: &Arc<dyn TaskPool>,
    info: &ConnectInfo)
    -> Result<Arc<ConnInner>, Error>
{
    if info.host.is_empty() || info.host.len() > MAX_HOST_NAME_LEN {
        return Err(Error::InvalidParameter);
    }
    if let Some(ref alpn) = info.alpn_protocols {
        if alpn.len() > MAX_ALPN_PROTOCOLS_LEN {
            return Err(Error::InvalidParameter);
        }
    }
    let timeout_ms = if info.timeout_ms == 0 {
        DEFAULT_TIMEOUT_MS
    } else {
        info.timeout_ms
    };
    let conn = Arc::new(ConnInner {
        transport: Mutex::new(None),
        req_q: Mutex::new(VecDeque::new()),
        resp_q: Mutex::new(VecDeque::new()),
        connected: AtomicBool::new(false),
        fatal: AtomicBool::new(false),
        sending: AtomicBool::new(false),
        pool: pool.clone(),
    });
    let server = ServerInfo {
        host: &info.host,
        port: info.port,
        timeout: Duration::from_millis(timeout_ms),
    };
    let credentials = if info.non_tls {
        None
    } else {
        Some(Credentials {
            root_ca: info.root_ca.as_ref().map(|v| &v[..]),
            client_cert: info.client_cert.as_ref().map(|v| &v[..]),
            private_key: info.private_key.as_ref().map(|v| &v[..]),
            alpn_protocols: info.alpn_protocols.as_ref().map(|s| &s[..]),
            disable_sni: info.disable_sni,
        })
    };
    let transport: Arc<dyn Transport> =
        match connector.connect(&server, credentials.as_ref()) {
            Ok(t) => Arc::from(t),
            Err(e) => {
                debug!("transport connect to {} failed: {}", info.host, e);
                return Err(Error::ConnectionError);
            }
        };
    let weak: Weak<ConnInner> = Arc::downgrade(&conn);
    let install = transport.set_receive_ready(Box::new(move || {
        if let Some(conn) = weak.upgrade() {
            dispatch_receive(&conn);
        }
    }));
    if let Err(e) = install {
        debug!("installing the receive callback failed: {}", e);
        netdriver::shutdown(&*transport);
        return Err(Error::InternalError);
    }
    *conn.transport.lock().expect("transport slot poisoned") =
        Some(transport);
    conn.connected.store(true, Ordering::SeqCst);
    debug!("connected to {}:{}", info.host, info.port);
    Ok(conn)
}

/// Append to the tail of the request FIFO; schedule a send task when the
/// queue was empty (otherwise the dispatcher schedules it after the
/// previous response completes).
fn submit_request(conn: &Arc<ConnInner>, req: &Arc<RequestInner>)
    -> Result<(), Error>
{
    {
        let mut st = req.lock();
        if st.submitted {
            return Err(Error::InvalidParameter);
        }
        st.submitted = true;
    }
    let schedule = {
        let mut q = conn.req_q();
        q.push_back(req.clone());
        q.len() == 1
    };
    if schedule {
        if let Err(e) = schedule_send(conn, req.clone()) {
            conn.req_q().retain(|r| !Arc::ptr_eq(r, req));
            req.lock().submitted = false;
            return Err(e);
        }
    }
    Ok(())
}

fn schedule_send(conn: &Arc<ConnInner>, req: Arc<RequestInner>)
    -> Result<(), Error>
{
    let task_conn = conn.clone();
    conn.pool.schedule(Box::new(move || send_task(&task_conn, &req)))
        .map_err(|e| {
            debug!("task pool refused the send task: {}", e);
            Error::AsyncScheduling
        })
}

fn schedule_next(conn: &Arc<ConnInner>) {
    loop {
        let head = conn.req_q().front().cloned();
        let req = match head {
            Some(req) => req,
            None => return,
        };
        match schedule_send(conn, req.clone()) {
            Ok(()) => return,
            Err(e) => {
                conn.req_q().retain(|r| !Arc::ptr_eq(r, &req));
                ResponseInner::deliver(&req.response, Err(e));
            }
        }
    }
}

/// The scheduled send task.
fn send_task(conn: &Arc<ConnInner>, req: &Arc<RequestInner>) {
    conn.sending.store(true, Ordering::SeqCst);
    let resp = req.response.clone();
    resp.finished_sending.store(false, Ordering::SeqCst);
    conn.resp_q().push_back(resp.clone());

    let result = match conn.transport() {
        None => Err(engine::SendFailure {
            error: Error::NetworkError,
            wire_dirty: false,
        }),
        Some(transport) => engine::send_request(&*transport, req),
    };

    match result {
        Ok(()) => {
            resp.finished_sending.store(true, Ordering::SeqCst);
            conn.sending.store(false, Ordering::SeqCst);
        }
        Err(failure) => {
            conn.sending.store(false, Ordering::SeqCst);
            debug!("send task failed: {}", failure.error);
            // withdraw the pair from the queues
            conn.req_q().retain(|r| !Arc::ptr_eq(r, req));
            conn.resp_q().retain(|r| !Arc::ptr_eq(r, &resp));
            if failure.wire_dirty {
                conn.fatal.store(true, Ordering::SeqCst);
                disconnect_and_clear(conn, None);
            } else {
                schedule_next(conn);
            }
            ResponseInner::deliver(&resp, Err(failure.error));
        }
    }
}

/// Receive-ready dispatch, on the transport's thread.
pub(crate) fn dispatch_receive(conn: &Arc<ConnInner>) {
    let transport = match conn.transport() {
        Some(t) => t,
        None => {
            debug!("receive-ready after teardown; ignoring");
            return;
        }
    };
    // bind before matching so the queue lock is released first
    let popped = conn.resp_q().pop_front();
    let resp = match popped {
        Some(r) => r,
        None => {
            error!("response bytes without a request in flight");
            conn.fatal.store(true, Ordering::SeqCst);
            disconnect_and_clear(conn, None);
            return;
        }
    };
    if !resp.finished_sending.load(Ordering::SeqCst) {
        error!("server responded before the request finished sending");
        conn.fatal.store(true, Ordering::SeqCst);
        // the request is still queued; clearing delivers its error
        disconnect_and_clear(conn, None);
        return;
    }

    let status = if resp.cancelled.load(Ordering::SeqCst) {
        debug!("skipping parse of a cancelled exchange");
        Err(Error::AsyncCancelled)
    } else {
        resp.lock().reset_for_receive();
        engine::receive_response(&*transport, &resp)
    };
    if matches!(status,
                Err(Error::ParsingError) | Err(Error::InsufficientMemory)) {
        conn.fatal.store(true, Ordering::SeqCst);
    }

    let close_requested = resp.non_persistent || resp.lock().close;
    if conn.fatal.load(Ordering::SeqCst) || close_requested {
        disconnect_and_clear(conn, Some(&resp));
    } else {
        engine::flush(&*transport, &resp);
    }

    {
        let mut q = conn.req_q();
        let is_current = q.front()
            .map_or(false, |r| Arc::ptr_eq(&r.response, &resp));
        if is_current {
            q.pop_front();
        }
    }
    schedule_next(conn);
    ResponseInner::deliver(&resp, status);
}

/// Tear down the transport and clear both queues. `current` is the
/// response the dispatcher is finishing; its delivery stays with the
/// caller, everything else is released here.
fn disconnect_and_clear(conn: &Arc<ConnInner>,
    current: Option<&Arc<ResponseInner>>)
{
    conn.connected.store(false, Ordering::SeqCst);
    let transport = conn.transport.lock()
        .expect("transport slot poisoned").take();
    if let Some(t) = transport {
        netdriver::shutdown(&*t);
        // dropping the handle is the destroy step
    }
    let dropped: Vec<Arc<RequestInner>> =
        conn.req_q().drain(..).collect();
    conn.resp_q().clear();
    for req in &dropped {
        if current.map_or(false, |c| Arc::ptr_eq(&req.response, c)) {
            continue;
        }
        debug!("dropping a queued request at disconnect");
        if let Some(ref handlers) = req.response.handlers {
            handlers.connection_closed();
        }
        ResponseInner::deliver(&req.response, Err(Error::NetworkError));
    }
    if let Some(c) = current {
        if let Some(ref handlers) = c.handlers {
            handlers.connection_closed();
        }
    }
}
