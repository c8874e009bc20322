
quick_error! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Status of a client operation
    pub enum Error {
        /// Null-ish or out-of-range input
        InvalidParameter {
            description("invalid parameter")
        }
        /// A caller-supplied buffer is too small for the data it must hold
        InsufficientMemory {
            description("caller buffer too small")
        }
        /// The transport failed to establish the connection
        ConnectionError {
            description("transport connect failed")
        }
        /// A synchronization primitive or transport callback setup failed
        InternalError {
            description("internal error")
        }
        /// Send was incomplete or the transport reported an error
        NetworkError {
            description("network error")
        }
        /// The transport receive returned nothing within its timeout
        TimeoutError {
            description("timed out waiting for the server")
        }
        /// The response is not well-formed HTTP/1.1
        ParsingError {
            description("malformed response message")
        }
        /// The response body exceeds the provided body buffer
        MessageTooLarge {
            description("response body exceeds the body buffer")
        }
        /// The request was cancelled cooperatively
        AsyncCancelled {
            description("request cancelled")
        }
        /// The task pool refused the send task
        AsyncScheduling {
            description("failed to schedule the send task")
        }
        /// Connection in use at disconnect, or the synchronous wait timed out
        Busy {
            description("connection busy")
        }
        /// Header, status or content length not present in the response
        NotFound {
            description("not present in the response")
        }
        /// The operation is out of scope for this client
        NotSupported {
            description("operation not supported")
        }
        /// Second call to the single-shot request body writer
        MessageFinished {
            description("request body already written")
        }
    }
}
