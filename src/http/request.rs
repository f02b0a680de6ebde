use base64::Engine;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

#[derive(Eq, Hash, PartialEq, Copy, Clone, Debug)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl Method {
    pub fn from_string(s: &str) -> Method {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "CONNECT" => Method::CONNECT,
            "OPTIONS" => Method::OPTIONS,
            "TRACE" => Method::TRACE,
            "PATCH" => Method::PATCH,
            _ => Method::GET,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::CONNECT => "CONNECT",
            Method::OPTIONS => "OPTIONS",
            Method::TRACE => "TRACE",
            Method::PATCH => "PATCH",
        }
    }
}

/// A captured path parameter. Dynamic segments bind exactly one value,
/// catch-all segments bind the consumed segments in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Single(String),
    Many(Vec<String>),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Many(_) => None,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        match self {
            ParamValue::Single(s) => std::slice::from_ref(s),
            ParamValue::Many(v) => v,
        }
    }
}

/// Parameter bindings produced by one resolution. Created fresh per
/// request, never shared between requests.
pub type Params = HashMap<String, ParamValue>;

#[derive(Debug)]
pub struct Body {
    pub(crate) content_type: String,
    pub(crate) data: Vec<u8>,
}

impl Body {
    pub fn new() -> Body {
        Body {
            content_type: String::new(),
            data: Vec::new(),
        }
    }

    pub fn from_string(s: &str) -> Body {
        Body {
            content_type: "text/plain".to_string(),
            data: s.as_bytes().to_vec(),
        }
    }

    pub fn from_bytes(b: Vec<u8>) -> Body {
        Body {
            content_type: "application/octet-stream".to_string(),
            data: b,
        }
    }

    pub fn with_content_type(content_type: &str, data: Vec<u8>) -> Body {
        Body {
            content_type: content_type.to_string(),
            data,
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn json<T>(&self) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.base_type() == "application/json" {
            serde_json::from_slice(&self.data).ok()
        } else {
            None
        }
    }

    pub fn x_www_form_urlencoded<T>(&self) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.base_type() == "application/x-www-form-urlencoded" {
            serde_json::from_value(Self::parse_urlencoded(&self.data)?).ok()
        } else {
            None
        }
    }

    pub fn form_data<T>(&self) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        if self.content_type.starts_with("multipart/form-data") {
            serde_json::from_value(Self::parse_multipart(&self.content_type, &self.data)?).ok()
        } else {
            None
        }
    }

    /// Decodes the body into a generic JSON value, picking the decoder
    /// from the content type.
    pub fn to_value(&self) -> Option<Value> {
        match self.base_type() {
            "application/json" => serde_json::from_slice(&self.data).ok(),
            "application/x-www-form-urlencoded" => Self::parse_urlencoded(&self.data),
            t if t.starts_with("multipart/form-data") => {
                Self::parse_multipart(&self.content_type, &self.data)
            }
            _ => None,
        }
    }

    // media type without boundary/charset parameters
    fn base_type(&self) -> &str {
        self.content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
    }

    fn parse_urlencoded(data: &[u8]) -> Option<Value> {
        let data_str = String::from_utf8_lossy(data);
        let mut fields = Map::new();

        for pair in data_str.split('&').filter(|s| !s.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(key).ok()?.into_owned();
            let value = urlencoding::decode(value).ok()?.into_owned();
            fields.insert(key, Value::String(value));
        }

        Some(Value::Object(fields))
    }

    fn parse_multipart(content_type: &str, data: &[u8]) -> Option<Value> {
        let boundary = content_type
            .split(';')
            .find_map(|s| s.trim().strip_prefix("boundary="))?
            .trim_matches('"');
        let delimiter = format!("--{}", boundary).into_bytes();

        let mut fields = Map::new();
        let mut rest = &data[Self::find(data, &delimiter)? + delimiter.len()..];

        loop {
            if rest.starts_with(b"--") {
                break;
            }
            let rest_part = rest.strip_prefix(b"\r\n").unwrap_or(rest);
            let end = Self::find(rest_part, &delimiter)?;
            let part = &rest_part[..end];
            rest = &rest_part[end + delimiter.len()..];

            let part = part.strip_suffix(b"\r\n").unwrap_or(part);
            let sep = Self::find(part, b"\r\n\r\n")?;
            let headers = Self::part_headers(&part[..sep])?;
            let content = &part[sep + 4..];

            let name = match headers.get("name") {
                Some(name) => name.clone(),
                None => continue,
            };

            let value = if let Some(filename) = headers.get("filename") {
                json!({
                    "filename": filename,
                    "content": base64::engine::general_purpose::STANDARD.encode(content),
                    "content_type": headers
                        .get("content-type")
                        .cloned()
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                })
            } else {
                Value::String(String::from_utf8_lossy(content).into_owned())
            };

            fields.insert(name, value);
        }

        Some(Value::Object(fields))
    }

    fn part_headers(raw: &[u8]) -> Option<HashMap<String, String>> {
        let raw = std::str::from_utf8(raw).ok()?;
        let mut map = HashMap::new();

        for line in raw.split("\r\n") {
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim();

                if key == "content-disposition" {
                    for param in value.split(';').skip(1) {
                        if let Some((k, v)) = param.trim().split_once('=') {
                            map.insert(k.to_string(), v.trim_matches('"').to_string());
                        }
                    }
                } else {
                    map.insert(key, value.to_string());
                }
            }
        }

        Some(map)
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }
}

impl Default for Body {
    fn default() -> Body {
        Body::new()
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Body {
        Body::from_bytes(b)
    }
}

#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub params: Params,
    pub headers: HashMap<String, String>,
    pub data: HashMap<String, Value>,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, path: &str) -> Request {
        Request {
            method,
            path: path.to_string(),
            query: HashMap::new(),
            params: Params::new(),
            headers: HashMap::new(),
            data: HashMap::new(),
            body: Body::new(),
        }
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|v| v.as_str())
    }

    pub fn get_method(&self) -> &Method {
        &self.method
    }

    /// Value bound by a dynamic segment; `None` for catch-all captures.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(|v| v.as_str())
    }

    /// Segments bound by a catch-all (or single dynamic) segment.
    pub fn param_all(&self, name: &str) -> Option<&[String]> {
        self.params.get(name).map(|v| v.as_slice())
    }

    /// True for connection-upgrade handshakes (e.g. WebSocket). The
    /// dispatcher routes these to the node's upgrade handler.
    pub fn is_upgrade(&self) -> bool {
        self.headers
            .get("connection")
            .map(|v| v.to_lowercase().contains("upgrade"))
            .unwrap_or(false)
            && self.headers.contains_key("upgrade")
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set_data<T>(&mut self, key: &str, value: T)
    where
        T: serde::Serialize,
    {
        if let Ok(value) = serde_json::to_value(value) {
            self.data.insert(key.to_string(), value);
        }
    }

    pub fn get_typed_data<T>(&self, key: &str) -> Option<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.to_owned()).ok())
    }
}
