//! Authentication challenge construction.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use credsweep_core::{Password, Target};
use quick_xml::escape::escape;
use uuid::Uuid;

/// One request ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Endpoint the payload is posted to
    pub url: String,
    /// Serialized request body
    pub payload: String,
    /// Per-request id, sent as `client-request-id` and used in logs
    pub correlation_id: Uuid,
}

/// Builds provider-specific challenges for a candidate.
///
/// The coordinator never looks inside the payload.
pub trait ChallengeBuilder: Send + Sync {
    /// Build the challenge for `username`/`password` against `target`.
    ///
    /// `password` is `None` for the absent-password sentinel.
    fn build(&self, target: &Target, username: &str, password: Option<&Password>) -> Challenge;
}

/// WS-Trust `usernamemixed` envelope for the Azure AD Seamless SSO
/// autologon endpoint.
#[derive(Debug, Clone)]
pub struct AzureSsoChallengeBuilder {
    validity: Duration,
}

impl AzureSsoChallengeBuilder {
    /// Lifetime of the security timestamp in each envelope.
    pub const DEFAULT_VALIDITY_SECS: i64 = 600;

    /// Builder with the default ten minute timestamp validity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validity: Duration::seconds(Self::DEFAULT_VALIDITY_SECS),
        }
    }

    /// Render the envelope for a given instant and set of ids.
    fn envelope(
        &self,
        url: &str,
        qualified_username: &str,
        password: &str,
        created: DateTime<Utc>,
        message_id: Uuid,
        token_id: Uuid,
    ) -> String {
        let expires = created + self.validity;
        let created = created.to_rfc3339_opts(SecondsFormat::Millis, true);
        let expires = expires.to_rfc3339_opts(SecondsFormat::Millis, true);
        let url = escape(url);
        let username = escape(qualified_username);
        let password = escape(password);

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd" xmlns:saml="urn:oasis:names:tc:SAML:1.0:assertion" xmlns:wsp="http://schemas.xmlsoap.org/ws/2004/09/policy" xmlns:wsu="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd" xmlns:wsa="http://www.w3.org/2005/08/addressing" xmlns:wssc="http://schemas.xmlsoap.org/ws/2005/02/sc" xmlns:wst="http://schemas.xmlsoap.org/ws/2005/02/trust" xmlns:ic="http://schemas.xmlsoap.org/ws/2005/05/identity">
  <s:Header>
    <wsa:Action s:mustUnderstand="1">http://schemas.xmlsoap.org/ws/2005/02/trust/RST/Issue</wsa:Action>
    <wsa:To s:mustUnderstand="1">{url}</wsa:To>
    <wsa:MessageID>urn:uuid:{message_id}</wsa:MessageID>
    <wsse:Security s:mustUnderstand="1">
      <wsu:Timestamp wsu:Id="_0">
        <wsu:Created>{created}</wsu:Created>
        <wsu:Expires>{expires}</wsu:Expires>
      </wsu:Timestamp>
      <wsse:UsernameToken wsu:Id="uuid-{token_id}">
        <wsse:Username>{username}</wsse:Username>
        <wsse:Password>{password}</wsse:Password>
      </wsse:UsernameToken>
    </wsse:Security>
  </s:Header>
  <s:Body>
    <wst:RequestSecurityToken Id="RST0">
      <wst:RequestType>http://schemas.xmlsoap.org/ws/2005/02/trust/Issue</wst:RequestType>
      <wsp:AppliesTo>
        <wsa:EndpointReference>
          <wsa:Address>urn:federation:MicrosoftOnline</wsa:Address>
        </wsa:EndpointReference>
      </wsp:AppliesTo>
      <wst:KeyType>http://schemas.xmlsoap.org/ws/2005/05/identity/NoProofKey</wst:KeyType>
    </wst:RequestSecurityToken>
  </s:Body>
</s:Envelope>"#
        )
    }
}

impl Default for AzureSsoChallengeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChallengeBuilder for AzureSsoChallengeBuilder {
    fn build(&self, target: &Target, username: &str, password: Option<&Password>) -> Challenge {
        let url = target.endpoint_url();
        let payload = self.envelope(
            &url,
            &target.qualified_username(username),
            password.map_or("", Password::expose),
            Utc::now(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );

        Challenge {
            url,
            payload,
            correlation_id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::AuthResponse;
    use chrono::TimeZone;

    fn contoso() -> Target {
        Target::for_domain("contoso.com")
    }

    #[test]
    fn test_build_targets_tenant_endpoint() {
        let challenge = AzureSsoChallengeBuilder::new().build(
            &contoso(),
            "alice",
            Some(&Password::new("Winter2024")),
        );

        assert_eq!(
            challenge.url,
            "https://autologon.microsoftazuread-sso.com/contoso.com/winauth/trust/2005/usernamemixed"
        );
        assert!(challenge
            .payload
            .contains("<wsse:Username>alice@contoso.com</wsse:Username>"));
        assert!(challenge
            .payload
            .contains("<wsse:Password>Winter2024</wsse:Password>"));
        assert!(challenge
            .payload
            .contains(&format!("<wsa:To s:mustUnderstand=\"1\">{}</wsa:To>", challenge.url)));
    }

    #[test]
    fn test_correlation_ids_are_unique() {
        let builder = AzureSsoChallengeBuilder::new();
        let first = builder.build(&contoso(), "alice", None);
        let second = builder.build(&contoso(), "alice", None);
        assert_ne!(first.correlation_id, second.correlation_id);
    }

    #[test]
    fn test_absent_password_renders_empty_element() {
        let challenge = AzureSsoChallengeBuilder::new().build(&contoso(), "alice", None);
        assert!(challenge
            .payload
            .contains("<wsse:Password></wsse:Password>"));
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let challenge = AzureSsoChallengeBuilder::new().build(
            &contoso(),
            "o'brien",
            Some(&Password::new("p<&>\"ss")),
        );
        assert!(challenge
            .payload
            .contains("<wsse:Password>p&lt;&amp;&gt;&quot;ss</wsse:Password>"));
        assert!(!challenge.payload.contains("p<&>"));
    }

    #[test]
    fn test_envelope_is_well_formed() {
        // The response parser tolerates garbage, so a clean parse with no
        // fields only proves the envelope reads as XML end to end.
        let challenge = AzureSsoChallengeBuilder::new().build(
            &contoso(),
            "alice",
            Some(&Password::new("a&b")),
        );
        let mut reader = quick_xml::Reader::from_str(&challenge.payload);
        loop {
            match reader.read_event() {
                Ok(quick_xml::events::Event::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("envelope is not well formed: {e}"),
            }
        }
        assert_eq!(AuthResponse::parse(&challenge.payload), AuthResponse::default());
    }

    #[test]
    fn test_timestamp_window() {
        let builder = AzureSsoChallengeBuilder::new();
        let created = Utc
            .with_ymd_and_hms(2024, 1, 15, 9, 30, 0)
            .single()
            .expect("valid timestamp");
        let payload = builder.envelope(
            "https://example.test/",
            "alice@contoso.com",
            "pw",
            created,
            Uuid::nil(),
            Uuid::nil(),
        );

        assert!(payload.contains("<wsu:Created>2024-01-15T09:30:00.000Z</wsu:Created>"));
        assert!(payload.contains("<wsu:Expires>2024-01-15T09:40:00.000Z</wsu:Expires>"));
        assert!(payload.contains(
            "<wsa:MessageID>urn:uuid:00000000-0000-0000-0000-000000000000</wsa:MessageID>"
        ));
    }
}
