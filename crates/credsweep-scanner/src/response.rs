use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// Element carrying the SSO token on a successful exchange.
const SSO_TOKEN_ELEMENT: &[u8] = b"DesktopSsoToken";
/// Parent of the provider error text inside a SOAP fault.
const INTERNAL_ERROR_ELEMENT: &[u8] = b"internalerror";
/// Provider error text element.
const ERROR_TEXT_ELEMENT: &[u8] = b"text";

/// Response delivered by a transport: status line and body, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Structured fields extracted from the body.
    #[must_use]
    pub fn fields(&self) -> AuthResponse {
        AuthResponse::parse(&self.body)
    }
}

/// The two fields of an authentication response the classifier looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResponse {
    pub sso_token: Option<String>,
    pub error_text: Option<String>,
}

impl AuthResponse {
    /// Extract the SSO token and provider error text from a WS-Trust body.
    ///
    /// Element matching ignores namespace prefixes. Parsing never fails: a
    /// malformed document yields whatever was found before the fault.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let (sso_token, error_text) = extract_fields(body);
        Self {
            sso_token,
            error_text,
        }
    }
}

fn extract_fields(body: &str) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut sso_token: Option<String> = None;
    let mut error_text: Option<String> = None;

    loop {
        let text = match reader.read_event() {
            Ok(Event::Start(start)) => {
                path.push(start.local_name().as_ref().to_vec());
                continue;
            }
            Ok(Event::End(_)) => {
                path.pop();
                continue;
            }
            Ok(Event::Text(text)) => match text.unescape() {
                Ok(unescaped) => unescaped.into_owned(),
                Err(_) => String::from_utf8_lossy(&text).into_owned(),
            },
            Ok(Event::CData(data)) => String::from_utf8_lossy(&data).into_owned(),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(
                    "Stopped parsing response at byte {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
        };

        match path.as_slice() {
            [.., current] if current == SSO_TOKEN_ELEMENT => {
                sso_token.get_or_insert_with(String::new).push_str(&text);
            }
            [.., parent, current]
                if parent == INTERNAL_ERROR_ELEMENT && current == ERROR_TEXT_ELEMENT =>
            {
                if error_text.is_none() {
                    error_text = Some(text);
                }
            }
            _ => {}
        }

        if sso_token.is_some() && error_text.is_some() {
            break;
        }
    }

    (sso_token, error_text)
}
