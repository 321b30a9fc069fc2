use super::transport::{PushResponse, TransportFault};

/// The classified result of exactly one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint acknowledged with a 2xx status.
    Success { status: u16 },
    /// The endpoint was reachable but returned a non-success status.
    Rejected { status: u16, body: String },
    /// The call itself faulted (network error, timeout, DNS failure).
    TransportFailure { description: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success { .. })
    }

    /// Whether this outcome obligates a backup capture of the payload.
    pub fn needs_backup(&self) -> bool {
        !self.is_success()
    }
}

/// Pure mapping from a raw transport result to a [`DeliveryOutcome`].
///
/// Only the status class decides between `Success` and `Rejected`; a fault
/// raised by the call itself is always `TransportFailure`. Body-read faults
/// after a success status never reach this function (the transport keeps the
/// status and substitutes an empty body).
pub fn classify(result: &Result<PushResponse, TransportFault>) -> DeliveryOutcome {
    match result {
        Ok(response) if response.is_success() => DeliveryOutcome::Success {
            status: response.status,
        },
        Ok(response) => DeliveryOutcome::Rejected {
            status: response.status,
            body: response.body_text(),
        },
        Err(fault) => DeliveryOutcome::TransportFailure {
            description: fault.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn response(status: u16, body: &'static str) -> Result<PushResponse, TransportFault> {
        Ok(PushResponse {
            status,
            body: Bytes::from_static(body.as_bytes()),
        })
    }

    #[test]
    fn two_hundred_class_is_success() {
        for status in [200, 201, 204, 299] {
            let outcome = classify(&response(status, ""));
            assert_eq!(outcome, DeliveryOutcome::Success { status });
            assert!(!outcome.needs_backup());
        }
    }

    #[test]
    fn non_success_status_is_rejected_with_body() {
        let outcome = classify(&response(500, "internal error"));
        assert_eq!(
            outcome,
            DeliveryOutcome::Rejected {
                status: 500,
                body: "internal error".to_string(),
            }
        );
        assert!(outcome.needs_backup());
    }

    #[test]
    fn status_just_outside_the_class_is_rejected() {
        assert!(classify(&response(199, "")).needs_backup());
        assert!(classify(&response(300, "")).needs_backup());
    }

    #[test]
    fn fault_is_transport_failure_with_description() {
        let result = Err(TransportFault::ConnectionFailed(
            "connection refused".to_string(),
        ));
        let outcome = classify(&result);
        match outcome {
            DeliveryOutcome::TransportFailure { ref description } => {
                assert!(description.contains("connection refused"));
            }
            other => panic!("expected TransportFailure, got {other:?}"),
        }
        assert!(outcome.needs_backup());
    }
}
