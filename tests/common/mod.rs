#![allow(dead_code)]
//! Scripted transport, connector and task pool used by the integration
//! tests. The transport records every `send` call for on-wire assertions
//! and replays a queue of receive chunks; crossing a configured send count
//! fires the receive-ready callback from a separate thread, the way a real
//! transport would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fixbuf_https::{Connector, Credentials, Error, ReceiveReady,
                   ServerInfo, TaskPool, Transport};

/// Runs every job inline on the submitting thread.
pub struct InlinePool;

impl TaskPool for InlinePool {
    fn schedule(&self, job: Box<dyn FnOnce() + Send>) -> Result<(), Error> {
        job();
        Ok(())
    }
}

/// Refuses every job.
pub struct RejectingPool;

impl TaskPool for RejectingPool {
    fn schedule(&self, _job: Box<dyn FnOnce() + Send>)
        -> Result<(), Error>
    {
        Err(Error::InternalError)
    }
}

struct MockState {
    recv: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    fire_points: Vec<usize>,
    send_hook: Option<Box<dyn Fn(usize) + Send>>,
}

pub struct MockTransport {
    state: Mutex<MockState>,
    ready: Mutex<Option<ReceiveReady>>,
    closed: AtomicBool,
}

impl MockTransport {
    /// `recv` chunks are replayed in order (an exhausted queue reads as a
    /// timeout); after the n-th `send` call for each n in `fire_points`
    /// the receive-ready callback fires on a helper thread.
    pub fn new(recv: Vec<Vec<u8>>, fire_points: Vec<usize>)
        -> Arc<MockTransport>
    {
        Arc::new(MockTransport {
            state: Mutex::new(MockState {
                recv: recv.into_iter().collect(),
                sent: Vec::new(),
                fire_points: fire_points,
                send_hook: None,
            }),
            ready: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn handle(self: &Arc<Self>) -> MockHandle {
        MockHandle(self.clone())
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_concat(&self) -> Vec<u8> {
        self.sent().concat()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Invoked with the 1-based index of each send call, before the bytes
    /// are acknowledged. Used to cancel mid-send.
    pub fn set_send_hook(&self, hook: Box<dyn Fn(usize) + Send>) {
        self.state.lock().unwrap().send_hook = Some(hook);
    }

    /// Fire the receive-ready callback on the calling thread.
    pub fn fire_sync(&self) {
        let ready = self.ready.lock().unwrap();
        if let Some(ref callback) = *ready {
            callback();
        }
    }

    fn fire_deferred(self: &Arc<Self>) {
        let me = self.clone();
        thread::spawn(move || {
            // let the send task publish its completion first
            thread::sleep(Duration::from_millis(50));
            me.fire_sync();
        });
    }
}

#[derive(Clone)]
pub struct MockHandle(pub Arc<MockTransport>);

impl Transport for MockHandle {
    fn send(&self, data: &[u8]) -> usize {
        if self.0.closed.load(Ordering::SeqCst) {
            return 0;
        }
        let fire = {
            let mut st = self.0.state.lock().unwrap();
            st.sent.push(data.to_vec());
            let n = st.sent.len();
            if let Some(ref hook) = st.send_hook {
                hook(n);
            }
            st.fire_points.contains(&n)
        };
        if fire {
            self.0.fire_deferred();
        }
        data.len()
    }

    fn receive(&self, buf: &mut [u8]) -> isize {
        if self.0.closed.load(Ordering::SeqCst) {
            return -1;
        }
        let mut st = self.0.state.lock().unwrap();
        match st.recv.front_mut() {
            None => 0, // nothing scripted: timeout
            Some(chunk) => {
                let take = chunk.len().min(buf.len());
                buf[..take].copy_from_slice(&chunk[..take]);
                chunk.drain(..take);
                let empty = chunk.is_empty();
                if empty {
                    st.recv.pop_front();
                }
                take as isize
            }
        }
    }

    fn set_receive_ready(&self, callback: ReceiveReady)
        -> Result<(), Error>
    {
        *self.0.ready.lock().unwrap() = Some(callback);
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out pre-built transports, one per connect call.
pub struct MockConnector {
    transports: Mutex<VecDeque<MockHandle>>,
}

impl MockConnector {
    pub fn single(mock: &Arc<MockTransport>) -> Arc<MockConnector> {
        MockConnector::queued(vec![mock.handle()])
    }

    pub fn queued(handles: Vec<MockHandle>) -> Arc<MockConnector> {
        Arc::new(MockConnector {
            transports: Mutex::new(handles.into_iter().collect()),
        })
    }
}

impl Connector for MockConnector {
    fn connect(&self, _server: &ServerInfo,
        _credentials: Option<&Credentials>)
        -> Result<Box<dyn Transport>, Error>
    {
        match self.transports.lock().unwrap().pop_front() {
            Some(handle) => Ok(Box::new(handle)),
            None => Err(Error::NetworkError),
        }
    }
}

/// Poll `condition` for up to five seconds.
pub fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for: {}", what);
}
