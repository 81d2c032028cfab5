use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;

const BOUNDARY_PREFIX: &str = "mailroom-alt";

/// An outgoing RFC 822 message with a plain-text part and an optional HTML
/// alternative.
#[derive(Debug, Clone)]
pub struct OutgoingMessage<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub text: &'a str,
    pub html: Option<&'a str>,
}

impl OutgoingMessage<'_> {
    pub fn render(&self, boundary_seed: &str) -> String {
        let boundary = format!("{}-{}", BOUNDARY_PREFIX, boundary_seed);
        let mut out = String::new();

        out.push_str(&format!("To: {}\r\n", self.to));
        out.push_str(&format!("Subject: {}\r\n", encode_header(self.subject)));
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str(&format!(
            "Content-Type: multipart/alternative; boundary=\"{}\"\r\n\r\n",
            boundary
        ));

        push_part(&mut out, &boundary, "text/plain", self.text);
        if let Some(html) = self.html {
            push_part(&mut out, &boundary, "text/html", html);
        }
        out.push_str(&format!("--{}--\r\n", boundary));

        out
    }

    /// The base64url form the Gmail `send` endpoint expects in `raw`.
    pub fn to_raw(&self, boundary_seed: &str) -> String {
        URL_SAFE.encode(self.render(boundary_seed).as_bytes())
    }
}

fn push_part(out: &mut String, boundary: &str, mime: &str, body: &str) {
    out.push_str(&format!("--{}\r\n", boundary));
    out.push_str(&format!("Content-Type: {}; charset=\"utf-8\"\r\n", mime));
    out.push_str("Content-Transfer-Encoding: base64\r\n\r\n");
    let encoded = STANDARD.encode(body.as_bytes());
    for line in encoded.as_bytes().chunks(76) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
}

/// RFC 2047 encoded-word for non-ASCII subjects.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_both_alternatives() {
        let msg = OutgoingMessage {
            to: "ana@example.com",
            subject: "Re: Budget",
            text: "Sounds good.",
            html: Some("<p>Sounds good.</p>"),
        };
        let rendered = msg.render("1");

        assert!(rendered.starts_with("To: ana@example.com\r\nSubject: Re: Budget\r\n"));
        assert!(rendered.contains("boundary=\"mailroom-alt-1\""));
        assert!(rendered.contains("Content-Type: text/plain"));
        assert!(rendered.contains("Content-Type: text/html"));
        assert!(rendered.contains(&STANDARD.encode("Sounds good.")));
        assert!(rendered.ends_with("--mailroom-alt-1--\r\n"));
    }

    #[test]
    fn plain_only_has_one_part() {
        let msg = OutgoingMessage {
            to: "ana@example.com",
            subject: "Hi",
            text: "Hello",
            html: None,
        };
        assert_eq!(msg.render("x").matches("Content-Type: text/").count(), 1);
    }

    #[test]
    fn non_ascii_subject_is_encoded() {
        assert_eq!(encode_header("Grüße"), format!("=?UTF-8?B?{}?=", STANDARD.encode("Grüße")));
        assert_eq!(encode_header("Plain"), "Plain");
    }

    #[test]
    fn raw_form_is_url_safe() {
        let msg = OutgoingMessage {
            to: "a@b.c",
            subject: "?>?>",
            text: "~~~???",
            html: None,
        };
        let raw = msg.to_raw("z");
        assert!(!raw.contains('+') && !raw.contains('/'));
        let decoded = URL_SAFE.decode(raw).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), msg.render("z"));
    }
}
