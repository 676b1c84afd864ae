//! Wire message types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Routing metadata carried in front of every body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransporterHeader {
    /// Identifier of the method invoker that should handle the request.
    pub method_identifier: String,

    /// Correlation id chosen by the client; echoed back in the reply.
    pub opaque: u64,

    /// Set on replies whose invocation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One framed message: a request or its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transporter {
    pub header: TransporterHeader,
    pub body: Bytes,
}

impl Transporter {
    pub fn request(method_identifier: impl Into<String>, opaque: u64, body: impl Into<Bytes>) -> Self {
        Self {
            header: TransporterHeader {
                method_identifier: method_identifier.into(),
                opaque,
                error: None,
            },
            body: body.into(),
        }
    }

    /// Successful reply to this request.
    pub fn reply(&self, body: impl Into<Bytes>) -> Self {
        Self {
            header: TransporterHeader {
                method_identifier: self.header.method_identifier.clone(),
                opaque: self.header.opaque,
                error: None,
            },
            body: body.into(),
        }
    }

    /// Failed reply to this request.
    pub fn reply_error(&self, message: impl Into<String>) -> Self {
        Self {
            header: TransporterHeader {
                method_identifier: self.header.method_identifier.clone(),
                opaque: self.header.opaque,
                error: Some(message.into()),
            },
            body: Bytes::new(),
        }
    }

    pub fn method_identifier(&self) -> &str {
        &self.header.method_identifier
    }

    pub fn opaque(&self) -> u64 {
        self.header.opaque
    }

    pub fn is_error(&self) -> bool {
        self.header.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replies_keep_correlation() {
        let request = Transporter::request("echo", 42, "ping");
        let ok = request.reply("pong");
        assert_eq!(ok.opaque(), 42);
        assert_eq!(ok.method_identifier(), "echo");
        assert!(!ok.is_error());

        let failed = request.reply_error("boom");
        assert_eq!(failed.opaque(), 42);
        assert_eq!(failed.header.error.as_deref(), Some("boom"));
        assert!(failed.body.is_empty());
    }

    #[test]
    fn header_omits_absent_error() {
        let header = Transporter::request("echo", 1, "").header;
        let json = serde_json::to_string(&header).unwrap();
        assert_eq!(json, r#"{"method_identifier":"echo","opaque":1}"#);
    }
}
