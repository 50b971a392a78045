//! The HTTP API in front of the windowed aggregator.
//!
//! ## Metrics
//!
//! `requests_received`: Total requests received
//! `transactions_recorded`: Transactions folded into the window
//! `transactions_rejected`: Transactions refused, labeled by reason
//!

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http::{Method, StatusCode, header};
use http_body_util::{BodyExt, combinators::BoxBody};
use hyper::{Request, Response, body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use metrics::counter;
use serde::Serialize;
use tokio::{
    net::TcpListener,
    pin,
    sync::{Semaphore, TryAcquireError},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use tally_window::{Error as RecordError, SharedWindow};

use crate::config::Config;
use crate::full;
use crate::signals::Shutdown;
use crate::wire::{self, DecodeError};

/// Errors produced by [`Api`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrapper for [`std::io::Error`].
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// The HTTP API server.
///
/// Owns the listening socket and a handle to the process-wide window; every
/// request handler works against that one window through its shared handle.
#[derive(Debug)]
pub struct Api {
    binding_addr: SocketAddr,
    concurrency_limit: usize,
    window: SharedWindow,
    shutdown: Shutdown,
    metric_labels: Vec<(String, String)>,
}

impl Api {
    /// Create a new [`Api`] server instance.
    #[must_use]
    pub fn new(config: &Config, window: SharedWindow, shutdown: Shutdown) -> Self {
        let metric_labels = vec![("component".to_string(), "api".to_string())];

        Self {
            binding_addr: config.binding_addr,
            concurrency_limit: config.concurrent_requests_max,
            window,
            shutdown,
            metric_labels,
        }
    }

    /// Run [`Api`] to completion
    ///
    /// This function runs the HTTP server forever, unless a shutdown signal
    /// is received or an unrecoverable error is encountered.
    ///
    /// # Errors
    ///
    /// Function will return an error if binding the listening socket fails.
    pub async fn run(self) -> Result<(), Error> {
        let Self {
            binding_addr,
            concurrency_limit,
            window,
            mut shutdown,
            metric_labels,
        } = self;

        let listener = TcpListener::bind(binding_addr).await?;
        info!("API server listening on {binding_addr}");

        let sem = Arc::new(Semaphore::new(concurrency_limit));
        let mut join_set = JoinSet::new();
        let handler = ApiHandler {
            window,
            labels: Arc::new(metric_labels),
        };

        let shutdown_fut = shutdown.recv();
        pin!(shutdown_fut);
        loop {
            tokio::select! {
                () = &mut shutdown_fut => {
                    info!("Shutdown signal received, stopping accept loop.");
                    break;
                }

                incoming = listener.accept() => {
                    let (stream, addr) = match incoming {
                        Ok(sa) => sa,
                        Err(e) => {
                            error!("Error accepting connection: {e}");
                            continue;
                        }
                    };
                    debug!("Accepted connection from {addr}");

                    let sem = Arc::clone(&sem);
                    let handler = handler.clone();

                    join_set.spawn(async move {
                        let permit = match sem.try_acquire() {
                            Ok(permit) => permit,
                            Err(TryAcquireError::Closed) => {
                                error!("Semaphore closed");
                                return;
                            }
                            Err(TryAcquireError::NoPermits) => {
                                warn!("API over connection capacity, load shedding");
                                drop(stream);
                                return;
                            }
                        };

                        let builder = auto::Builder::new(TokioExecutor::new());
                        let serve_future = builder.serve_connection(
                            TokioIo::new(stream),
                            service_fn(move |request| handler.clone().handle_request(request)),
                        );

                        if let Err(e) = serve_future.await {
                            error!("Error serving {addr}: {e}");
                        }
                        drop(permit);
                    });
                }
            }
        }

        drop(listener);
        while join_set.join_next().await.is_some() {}
        Ok(())
    }
}

/// Per-request view of the API: the shared window plus metric labels.
#[derive(Clone, Debug)]
struct ApiHandler {
    window: SharedWindow,
    labels: Arc<Vec<(String, String)>>,
}

impl ApiHandler {
    async fn handle_request(
        self,
        request: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
        counter!("requests_received", &*self.labels).increment(1);

        match (request.method(), request.uri().path()) {
            (&Method::POST, "/transactions") => self.create_transaction(request).await,
            (&Method::GET, "/statistics") => Ok(self.statistics()),
            (&Method::DELETE, "/transactions") => Ok(self.delete_transactions()),
            _ => Ok(empty_response(StatusCode::NOT_FOUND)),
        }
    }

    async fn create_transaction(
        self,
        request: Request<Incoming>,
    ) -> Result<Response<BoxBody<Bytes, hyper::Error>>, hyper::Error> {
        let body = request.into_body().collect().await?.to_bytes();

        let transaction = match wire::decode_transaction(&body) {
            Ok(transaction) => transaction,
            Err(error) => {
                debug!("rejected transaction payload: {error}");
                self.rejected("malformed");
                return Ok(json_response(
                    decode_error_status(&error),
                    &ErrorBody {
                        error: error.to_string(),
                    },
                ));
            }
        };

        match self
            .window
            .record(transaction.amount, transaction.timestamp_millis)
        {
            Ok(()) => {
                counter!("transactions_recorded", &*self.labels).increment(1);
                Ok(empty_response(StatusCode::CREATED))
            }
            // Too old to aggregate. Not a malformed payload, so the caller
            // gets an empty response rather than an error body.
            Err(RecordError::ExpiredTransaction) => {
                self.rejected("expired");
                Ok(empty_response(StatusCode::NO_CONTENT))
            }
            Err(error @ RecordError::FutureTransaction) => {
                self.rejected("future");
                Ok(json_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    &ErrorBody {
                        error: error.to_string(),
                    },
                ))
            }
        }
    }

    fn statistics(&self) -> Response<BoxBody<Bytes, hyper::Error>> {
        let statistics = self.window.snapshot();
        json_response(StatusCode::OK, &statistics)
    }

    fn delete_transactions(&self) -> Response<BoxBody<Bytes, hyper::Error>> {
        self.window.reset();
        debug!("cleared all transactions");
        empty_response(StatusCode::NO_CONTENT)
    }

    fn rejected(&self, reason: &'static str) {
        let mut labels = (*self.labels).clone();
        labels.push(("reason".to_string(), reason.to_string()));
        counter!("transactions_rejected", &labels).increment(1);
    }
}

fn decode_error_status(error: &DecodeError) -> StatusCode {
    match error {
        DecodeError::InvalidJson(_) => StatusCode::BAD_REQUEST,
        DecodeError::MissingField(_)
        | DecodeError::InvalidAmount
        | DecodeError::InvalidTimestamp => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn empty_response(status: StatusCode) -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut response = Response::new(full(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody<Bytes, hyper::Error>> {
    let body_bytes = serde_json::to_vec(body).expect("response body serialization cannot fail");
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(full(body_bytes))
        .expect("Creating HTTP response should not fail")
}

#[cfg(test)]
mod tests {
    use tally_window::{Clock, Statistics, Window};

    use super::*;

    #[test]
    fn decode_errors_map_to_client_statuses() {
        let invalid_json =
            wire::decode_transaction(b"not json").expect_err("garbage must not decode");
        assert_eq!(decode_error_status(&invalid_json), StatusCode::BAD_REQUEST);

        let missing_field = wire::decode_transaction(br#"{"amount": "5.00"}"#)
            .expect_err("missing timestamp must not decode");
        assert_eq!(
            decode_error_status(&missing_field),
            StatusCode::UNPROCESSABLE_ENTITY
        );

        let bad_amount = wire::decode_transaction(
            br#"{"amount": "five", "timestamp": "2024-01-01T00:00:00.000Z"}"#,
        )
        .expect_err("bad amount must not decode");
        assert_eq!(
            decode_error_status(&bad_amount),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn statistics_serialize_as_two_digit_decimal_strings() {
        #[derive(Debug, Clone, Copy)]
        struct FixedClock;

        impl Clock for FixedClock {
            fn now_millis(&self) -> i64 {
                1_700_000_000_000
            }
        }

        let mut window = Window::with_clock(FixedClock);
        for amount in ["100.5", "200.0", "0.255"] {
            window
                .record(amount.parse().expect("amount"), FixedClock.now_millis())
                .expect("in-window record");
        }
        let statistics: Statistics = window.snapshot();

        let body = serde_json::to_value(statistics).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "sum": "300.76",
                "avg": "100.25",
                "max": "200.00",
                "min": "0.26",
                "count": 3,
            })
        );
    }

    #[test]
    fn empty_and_json_responses_carry_expected_statuses() {
        let empty = empty_response(StatusCode::NO_CONTENT);
        assert_eq!(empty.status(), StatusCode::NO_CONTENT);

        let json = json_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            &ErrorBody {
                error: "failed to parse `amount` field".to_string(),
            },
        );
        assert_eq!(json.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            json.headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("application/json")
        );
    }
}
