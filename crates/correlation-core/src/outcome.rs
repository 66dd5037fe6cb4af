use bytes::Bytes;

/// Result of correlating one RTCP or NG payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The payload's QoS report belongs to `call_id`
    Correlated {
        /// Encoded QoS report
        report: Bytes,
        /// CallID the report was attributed to
        call_id: Bytes,
    },
    /// A QoS report was decoded but no cache knows its call; the report is
    /// dropped
    Uncorrelated,
    /// Nothing to correlate: informational packet, no QoS data, or a decode
    /// error
    Skipped,
}

impl Outcome {
    /// Whether a CallID was found
    pub fn is_correlated(&self) -> bool {
        matches!(self, Outcome::Correlated { .. })
    }

    /// The CallID, if correlated
    pub fn call_id(&self) -> Option<&Bytes> {
        match self {
            Outcome::Correlated { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    /// The QoS report, if correlated
    pub fn report(&self) -> Option<&Bytes> {
        match self {
            Outcome::Correlated { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Flatten into the `(report, call_id)` pair expected by HEP style
    /// senders; both are `None` unless correlated
    pub fn into_parts(self) -> (Option<Bytes>, Option<Bytes>) {
        match self {
            Outcome::Correlated { report, call_id } => (Some(report), Some(call_id)),
            _ => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        let outcome = Outcome::Correlated {
            report: Bytes::from_static(b"{}"),
            call_id: Bytes::from_static(b"abc"),
        };
        assert!(outcome.is_correlated());
        assert_eq!(outcome.call_id().unwrap().as_ref(), b"abc");
        assert_eq!(outcome.report().unwrap().as_ref(), b"{}");
        assert_eq!(
            outcome.into_parts(),
            (Some(Bytes::from_static(b"{}")), Some(Bytes::from_static(b"abc")))
        );

        assert_eq!(Outcome::Uncorrelated.into_parts(), (None, None));
        assert!(Outcome::Skipped.call_id().is_none());
        assert!(!Outcome::Skipped.is_correlated());
    }
}
