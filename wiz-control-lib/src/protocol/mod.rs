use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Port WiZ devices listen on for control and discovery datagrams.
pub const CONTROL_PORT: u16 = 38899;

/// Decode failure for an inbound datagram.
///
/// Decoding is total: any payload, JSON or not, yields either a [`Message`]
/// or one of these variants. Callers branch on the result; nothing here
/// crosses the boundary as a panic.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("payload has no method field")]
    MissingMethod,
    #[error("unrecognized method: {0}")]
    UnrecognizedMethod(String),
}

/// Result object of a `registration` response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegistrationResult {
    #[serde(default)]
    pub success: bool,
    /// Devices report their MAC here; it is the stable identity used by the
    /// registry when present.
    pub mac: Option<String>,
}

/// Result object of a `getSystemConfig` response.
///
/// All fields are optional on the wire. Firmware revisions disagree on the
/// spelling of `homeId`, hence the alias.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    pub mac: Option<String>,
    #[serde(alias = "homeid")]
    pub home_id: Option<u32>,
    pub fw_version: Option<String>,
    pub room_id: Option<u32>,
    pub group_id: Option<u32>,
    pub module_name: Option<String>,
}

/// A decoded control-protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Registration(RegistrationResult),
    SystemConfig(SystemConfig),
    PilotAck { success: bool },
}

/// The visual output state carried by a single `setPilot` command.
///
/// Exactly one mode per command. Equality between two states is the
/// semantic "has the rendered light state changed" comparison the command
/// driver uses for send suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotState {
    Color { r: u8, g: u8, b: u8, dimming: u8 },
    White { temp: u16, dimming: u8 },
    Power { on: bool },
}

#[derive(Deserialize)]
struct Envelope {
    method: Option<String>,
    result: Option<Value>,
}

#[derive(Default, Deserialize)]
struct AckResult {
    #[serde(default)]
    success: bool,
}

/// Builds the broadcast registration query.
///
/// The phone fields are placeholders; with `register: false` the device
/// only confirms reachability and does not store them.
pub fn registration_query() -> Vec<u8> {
    json!({
        "method": "registration",
        "params": {
            "phoneMac": "AAAAAAAAAAAA",
            "register": false,
            "phoneIp": "1.2.3.4",
            "id": "1",
        }
    })
    .to_string()
    .into_bytes()
}

/// Builds the unicast metadata query.
pub fn system_config_query() -> Vec<u8> {
    json!({ "method": "getSystemConfig", "id": 1 })
        .to_string()
        .into_bytes()
}

/// Encodes a `setPilot` command for the given state.
pub fn set_pilot(state: &PilotState) -> Vec<u8> {
    let params = match *state {
        PilotState::Color { r, g, b, dimming } => {
            json!({ "r": r, "g": g, "b": b, "dimming": dimming })
        }
        PilotState::White { temp, dimming } => json!({ "temp": temp, "dimming": dimming }),
        PilotState::Power { on } => json!({ "state": on }),
    };
    json!({ "method": "setPilot", "params": params })
        .to_string()
        .into_bytes()
}

/// Decodes an inbound datagram into a [`Message`].
///
/// Unknown JSON fields are ignored for forward compatibility. A missing
/// `result` object decodes as the all-default result, matching devices
/// that answer with a bare method echo.
pub fn decode(data: &[u8]) -> Result<Message, DecodeError> {
    let envelope: Envelope = serde_json::from_slice(data)?;
    let result = envelope.result.unwrap_or(Value::Null);
    match envelope.method.as_deref() {
        Some("registration") => Ok(Message::Registration(result_object(result)?)),
        Some("getSystemConfig") => Ok(Message::SystemConfig(result_object(result)?)),
        Some("setPilot") => {
            let ack: AckResult = result_object(result)?;
            Ok(Message::PilotAck {
                success: ack.success,
            })
        }
        Some(method) => Err(DecodeError::UnrecognizedMethod(method.to_string())),
        None => Err(DecodeError::MissingMethod),
    }
}

fn result_object<T: Default + DeserializeOwned>(value: Value) -> Result<T, DecodeError> {
    if value.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value)?)
}
