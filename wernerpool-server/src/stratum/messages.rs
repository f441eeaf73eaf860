//! Stratum v1 wire messages.
//!
//! The wire is line-delimited JSON with loosely typed payloads, so inbound
//! messages land in a generic request struct first and are then routed
//! through a tagged method enum. Anything outside the known method set is
//! harmless and acknowledged rather than rejected. Outbound traffic is
//! built here too, so the JSON shapes live in one place.

use serde::Deserialize;
use serde_json::{Value, json};

/// One inbound JSON-RPC object.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// The finite set of client methods the pool understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Configure,
    Subscribe,
    Authorize,
    Submit,
    ExtranonceSubscribe,
    SuggestDifficulty,
    Unknown(String),
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            "mining.configure" => Method::Configure,
            "mining.subscribe" => Method::Subscribe,
            "mining.authorize" => Method::Authorize,
            "mining.submit" => Method::Submit,
            "mining.extranonce.subscribe" => Method::ExtranonceSubscribe,
            "mining.suggest_difficulty" => Method::SuggestDifficulty,
            other => Method::Unknown(other.to_string()),
        }
    }
}

/// Stratum error codes, matching the legacy map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StratumError {
    Internal,
    LowDifficulty,
    Unauthorized,
}

impl StratumError {
    pub fn code(self) -> i64 {
        match self {
            StratumError::Internal => 20,
            StratumError::LowDifficulty => 23,
            StratumError::Unauthorized => 24,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            StratumError::Internal => "Internal error",
            StratumError::LowDifficulty => "Low difficulty share",
            StratumError::Unauthorized => "Unauthorized worker",
        }
    }
}

/// Parsed `mining.submit` parameters, still in wire-hex form.
#[derive(Debug, Clone)]
pub struct SubmitParams {
    pub worker: String,
    pub job_id: String,
    pub extranonce2: String,
    pub ntime: String,
    pub nonce: String,
    /// Present when the miner negotiated version rolling.
    pub version_bits: Option<String>,
}

impl SubmitParams {
    pub fn from_params(params: &[Value]) -> Option<Self> {
        let field = |i: usize| params.get(i).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            worker: field(0)?,
            job_id: field(1)?,
            extranonce2: field(2)?,
            ntime: field(3)?,
            nonce: field(4)?,
            version_bits: field(5),
        })
    }
}

fn line(value: Value) -> String {
    value.to_string()
}

/// Response mirroring the request id.
pub fn response(id: &Option<Value>, result: Value) -> String {
    line(json!({
        "id": id.clone().unwrap_or(Value::Null),
        "result": result,
        "error": Value::Null,
    }))
}

/// Error response `[code, message, null]`.
pub fn error_response(id: &Option<Value>, error: StratumError) -> String {
    line(json!({
        "id": id.clone().unwrap_or(Value::Null),
        "result": Value::Null,
        "error": [error.code(), error.message(), Value::Null],
    }))
}

/// Server-initiated notification (`id: null`).
pub fn notification(method: &str, params: Value) -> String {
    line(json!({
        "id": Value::Null,
        "method": method,
        "params": params,
    }))
}

pub fn set_difficulty(difficulty: f64) -> String {
    notification("mining.set_difficulty", json!([difficulty]))
}

/// `mining.notify` with the session's coinbase halves spliced in.
#[allow(clippy::too_many_arguments)]
pub fn notify(
    job_id: &str,
    prev_hash_wire: &str,
    coinbase1_hex: &str,
    coinbase2_hex: &str,
    merkle_branch: &[String],
    version_hex: &str,
    nbits_hex: &str,
    ntime_hex: &str,
    clean_jobs: bool,
) -> String {
    notification(
        "mining.notify",
        json!([
            job_id,
            prev_hash_wire,
            coinbase1_hex,
            coinbase2_hex,
            merkle_branch,
            version_hex,
            nbits_hex,
            ntime_hex,
            clean_jobs,
        ]),
    )
}

/// Reply to `mining.subscribe`.
pub fn subscribe_result(extranonce1_hex: &str, extranonce2_size: usize) -> Value {
    json!([
        [
            ["mining.set_difficulty", extranonce1_hex],
            ["mining.notify", extranonce1_hex],
        ],
        extranonce1_hex,
        extranonce2_size,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_and_without_id() {
        let req: Request =
            serde_json::from_str(r#"{"id":1,"method":"mining.subscribe","params":[]}"#).unwrap();
        assert_eq!(req.id, Some(json!(1)));
        assert_eq!(Method::from(req.method.as_str()), Method::Subscribe);

        let req: Request =
            serde_json::from_str(r#"{"method":"mining.notify","params":[]}"#).unwrap();
        assert_eq!(req.id, None);
    }

    #[test]
    fn unknown_methods_are_tagged_not_fatal() {
        assert_eq!(
            Method::from("mining.multi_version"),
            Method::Unknown("mining.multi_version".to_string())
        );
    }

    #[test]
    fn submit_params_parse() {
        let params = vec![
            json!("bc1qexample.worker1"),
            json!("00000002"),
            json!("0000abcd"),
            json!("665e0000"),
            json!("12345678"),
        ];
        let submit = SubmitParams::from_params(&params).unwrap();
        assert_eq!(submit.job_id, "00000002");
        assert_eq!(submit.version_bits, None);

        let mut with_bits = params.clone();
        with_bits.push(json!("00002000"));
        let submit = SubmitParams::from_params(&with_bits).unwrap();
        assert_eq!(submit.version_bits.as_deref(), Some("00002000"));

        assert!(SubmitParams::from_params(&params[..3]).is_none());
    }

    #[test]
    fn error_response_shape() {
        let lineout = error_response(&Some(json!(7)), StratumError::LowDifficulty);
        let parsed: Value = serde_json::from_str(&lineout).unwrap();
        assert_eq!(parsed["id"], json!(7));
        assert_eq!(parsed["result"], Value::Null);
        assert_eq!(parsed["error"], json!([23, "Low difficulty share", null]));
    }

    #[test]
    fn notification_has_null_id() {
        let lineout = set_difficulty(64.0);
        let parsed: Value = serde_json::from_str(&lineout).unwrap();
        assert_eq!(parsed["id"], Value::Null);
        assert_eq!(parsed["method"], "mining.set_difficulty");
        assert_eq!(parsed["params"], json!([64.0]));
    }

    #[test]
    fn subscribe_result_shape() {
        let result = subscribe_result("00000001", 4);
        assert_eq!(
            result,
            json!([
                [
                    ["mining.set_difficulty", "00000001"],
                    ["mining.notify", "00000001"]
                ],
                "00000001",
                4
            ])
        );
    }

    #[test]
    fn notify_param_order() {
        let lineout = notify(
            "0000000a",
            "aa".repeat(32).as_str(),
            "cb1",
            "cb2",
            &["ff".repeat(32)],
            "20000000",
            "1d00ffff",
            "665e0000",
            true,
        );
        let parsed: Value = serde_json::from_str(&lineout).unwrap();
        let params = parsed["params"].as_array().unwrap();
        assert_eq!(params[0], "0000000a");
        assert_eq!(params[4], json!(["ff".repeat(32)]));
        assert_eq!(params[8], json!(true));
    }
}
