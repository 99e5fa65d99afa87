//! XML-RPC 1.0 wire format over `serde_json::Value`.
//!
//! Value mapping:
//!
//! | JSON            | XML-RPC                                      |
//! |-----------------|----------------------------------------------|
//! | null            | `<nil/>`                                     |
//! | bool            | `<boolean>`                                  |
//! | integer         | `<int>` when it fits 32 bits, else `<i8>`    |
//! | float           | `<double>`                                   |
//! | string          | `<string>`                                   |
//! | array           | `<array><data>...</data></array>`            |
//! | object          | `<struct><member>...</member></struct>`      |
//!
//! Decoding also accepts `<i4>`, untyped `<value>text</value>` (a string),
//! `<dateTime.iso8601>` (kept as its string form) and `<base64>`.

use base64::Engine as _;
use base64::engine::general_purpose;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use roxmltree::{Document, Node};
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to encode XML-RPC call: {0}")]
    Encode(String),
    #[error("{0}")]
    Decode(String),
}

/// Decoded `methodResponse`.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    Success(Value),
    Fault { code: String, message: String },
}

/// Render a `methodCall` document.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the writer fails.
pub fn encode_call(method: &str, params: &[Value]) -> Result<String, CodecError> {
    let mut w = XmlWriter::new();
    w.event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    w.start("methodCall")?;
    w.element("methodName", method)?;
    w.start("params")?;
    for param in params {
        w.start("param")?;
        encode_value(&mut w, param)?;
        w.end("param")?;
    }
    w.end("params")?;
    w.end("methodCall")?;
    w.finish()
}

fn encode_value(w: &mut XmlWriter, value: &Value) -> Result<(), CodecError> {
    w.start("value")?;
    match value {
        Value::Null => w.empty("nil")?,
        Value::Bool(b) => w.element("boolean", if *b { "1" } else { "0" })?,
        Value::Number(n) => encode_number(w, n)?,
        Value::String(s) => w.element("string", s)?,
        Value::Array(items) => {
            w.start("array")?;
            w.start("data")?;
            for item in items {
                encode_value(w, item)?;
            }
            w.end("data")?;
            w.end("array")?;
        }
        Value::Object(members) => {
            w.start("struct")?;
            for (name, member) in members {
                w.start("member")?;
                w.element("name", name)?;
                encode_value(w, member)?;
                w.end("member")?;
            }
            w.end("struct")?;
        }
    }
    w.end("value")
}

fn encode_number(w: &mut XmlWriter, n: &Number) -> Result<(), CodecError> {
    if let Some(i) = n.as_i64() {
        if i32::try_from(i).is_ok() {
            w.element("int", &i.to_string())
        } else {
            w.element("i8", &i.to_string())
        }
    } else if let Some(f) = n.as_f64() {
        // u64 beyond i64::MAX lands here as well
        w.element("double", &f.to_string())
    } else {
        Err(CodecError::Encode(format!("unrepresentable number {n}")))
    }
}

/// Parse a `methodResponse` document.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] on malformed XML or unknown value types.
pub fn decode_response(body: &str) -> Result<MethodResponse, CodecError> {
    let doc = Document::parse(body).map_err(|e| CodecError::Decode(format!("invalid XML: {e}")))?;
    let root = doc.root_element();
    if root.tag_name().name() != "methodResponse" {
        return Err(CodecError::Decode(format!(
            "expected methodResponse, found {}",
            root.tag_name().name()
        )));
    }

    if let Some(fault) = child(root, "fault") {
        let value = child(fault, "value")
            .ok_or_else(|| CodecError::Decode("fault without value".to_owned()))?;
        return decode_fault(&decode_value(value)?);
    }

    let value = child(root, "params")
        .and_then(|params| child(params, "param"))
        .and_then(|param| child(param, "value"));
    match value {
        Some(value) => Ok(MethodResponse::Success(decode_value(value)?)),
        None => Ok(MethodResponse::Success(Value::Null)),
    }
}

fn decode_fault(value: &Value) -> Result<MethodResponse, CodecError> {
    let Value::Object(fault) = value else {
        return Err(CodecError::Decode("fault is not a struct".to_owned()));
    };
    let code = match fault.get("faultCode") {
        Some(Value::String(code)) => code.clone(),
        Some(Value::Number(code)) => code.to_string(),
        _ => String::new(),
    };
    let message = fault
        .get("faultString")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Ok(MethodResponse::Fault { code, message })
}

fn decode_value(node: Node<'_, '_>) -> Result<Value, CodecError> {
    let Some(typed) = node.children().find(Node::is_element) else {
        return Ok(Value::String(node.text().unwrap_or_default().to_owned()));
    };
    let text = typed.text().unwrap_or_default();
    match typed.tag_name().name() {
        "string" | "dateTime.iso8601" => Ok(Value::String(text.to_owned())),
        "int" | "i4" | "i8" => text
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| CodecError::Decode(format!("invalid integer '{text}'"))),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Bool(true)),
            "0" | "false" => Ok(Value::Bool(false)),
            other => Err(CodecError::Decode(format!("invalid boolean '{other}'"))),
        },
        "double" => text
            .trim()
            .parse::<f64>()
            .map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number))
            .map_err(|_| CodecError::Decode(format!("invalid double '{text}'"))),
        "base64" => Ok(Value::String(decode_base64(text))),
        "nil" => Ok(Value::Null),
        "array" => {
            let Some(data) = child(typed, "data") else {
                return Ok(Value::Array(Vec::new()));
            };
            data.children()
                .filter(|n| n.has_tag_name("value"))
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = Map::new();
            for member in typed.children().filter(|n| n.has_tag_name("member")) {
                let name = child(member, "name")
                    .and_then(|n| n.text())
                    .unwrap_or_default()
                    .to_owned();
                let value = match child(member, "value") {
                    Some(value) => decode_value(value)?,
                    None => Value::Null,
                };
                members.insert(name, value);
            }
            Ok(Value::Object(members))
        }
        other => Err(CodecError::Decode(format!("unsupported value type <{other}>"))),
    }
}

/// Base64 payloads are surfaced as text; undecodable input is kept verbatim.
fn decode_base64(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    match general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => text.to_owned(),
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

struct XmlWriter {
    inner: Writer<Vec<u8>>,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), CodecError> {
        self.inner.write_event(event).map_err(encode_err)
    }

    fn start(&mut self, name: &str) -> Result<(), CodecError> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<(), CodecError> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn empty(&mut self, name: &str) -> Result<(), CodecError> {
        self.event(Event::Empty(BytesStart::new(name)))
    }

    fn element(&mut self, name: &str, text: &str) -> Result<(), CodecError> {
        self.start(name)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> Result<String, CodecError> {
        String::from_utf8(self.inner.into_inner()).map_err(encode_err)
    }
}

fn encode_err(e: impl std::fmt::Display) -> CodecError {
    CodecError::Encode(e.to_string())
}
