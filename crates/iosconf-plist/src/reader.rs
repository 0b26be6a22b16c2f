//! XML property-list decoding.
//!
//! The reader understands the element vocabulary of the Apple plist DTD and
//! nothing else: no namespaces, no CDATA, no internal DTD subsets. Attributes
//! are ignored. Every malformed input maps to a [`PlistError`] variant.

use crate::PlistError;
use crate::value::{Dictionary, Value};

/// Decodes an XML property-list document.
pub fn from_xml_str(text: &str) -> Result<Value, PlistError> {
    let mut reader = Reader::new(text);
    let value = match reader.next_element("a value")? {
        Token::Open("plist") => {
            let value = reader.parse_value()?;
            reader.expect_close("plist")?;
            value
        }
        token => reader.value_from(token)?,
    };
    Ok(value)
}

/// Decodes the property list embedded in a larger byte blob.
///
/// Signed documents such as provisioning profiles wrap the XML payload in a
/// binary envelope. The payload runs from the first `<?xml` (or `<plist`
/// when no declaration is present) through the first `</plist>` after it.
pub fn from_embedded_bytes(bytes: &[u8]) -> Result<Value, PlistError> {
    let start = find_bytes(bytes, b"<?xml")
        .or_else(|| find_bytes(bytes, b"<plist"))
        .ok_or(PlistError::NotFound)?;
    let end_tag = b"</plist>";
    let end = find_bytes(&bytes[start..], end_tag)
        .map(|offset| start + offset + end_tag.len())
        .ok_or(PlistError::NotFound)?;
    let text = String::from_utf8_lossy(&bytes[start..end]);
    from_xml_str(&text)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Open(&'a str),
    Close(&'a str),
    Empty(&'a str),
    Text(&'a str),
    Eof,
}

impl Token<'_> {
    fn describe(&self) -> String {
        match self {
            Token::Open(name) => format!("<{name}>"),
            Token::Close(name) => format!("</{name}>"),
            Token::Empty(name) => format!("<{name}/>"),
            Token::Text(text) => format!("text {:?}", text.trim()),
            Token::Eof => "end of document".to_string(),
        }
    }
}

struct Reader<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), PlistError> {
        let start = self.pos;
        match self.src[start..].find(terminator) {
            Some(offset) => {
                self.pos = start + offset + terminator.len();
                Ok(())
            }
            None => Err(PlistError::Unterminated(start)),
        }
    }

    fn next_token(&mut self) -> Result<Token<'a>, PlistError> {
        loop {
            let rest = &self.src[self.pos..];
            if rest.is_empty() {
                return Ok(Token::Eof);
            }
            if rest.starts_with("<?") {
                self.skip_past("?>")?;
            } else if rest.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if rest.starts_with("<!") {
                self.skip_past(">")?;
            } else if let Some(tag) = rest.strip_prefix('<') {
                let end = tag.find('>').ok_or(PlistError::Unterminated(self.pos))?;
                let inner = &tag[..end];
                self.pos += end + 2;
                if let Some(name) = inner.strip_prefix('/') {
                    return Ok(Token::Close(name.trim()));
                }
                let (inner, empty) = match inner.strip_suffix('/') {
                    Some(inner) => (inner, true),
                    None => (inner, false),
                };
                let name = inner.split_whitespace().next().unwrap_or("");
                return Ok(if empty { Token::Empty(name) } else { Token::Open(name) });
            } else {
                let end = rest.find('<').unwrap_or(rest.len());
                self.pos += end;
                return Ok(Token::Text(&rest[..end]));
            }
        }
    }

    /// Next token that is not inter-element whitespace.
    fn next_element(&mut self, expected: &str) -> Result<Token<'a>, PlistError> {
        loop {
            match self.next_token()? {
                Token::Text(text) if text.trim().is_empty() => continue,
                Token::Text(text) => return Err(PlistError::UnexpectedText(text.trim().to_string())),
                Token::Eof => return Err(PlistError::UnexpectedEof(expected.to_string())),
                token => return Ok(token),
            }
        }
    }

    fn expect_close(&mut self, name: &str) -> Result<(), PlistError> {
        match self.next_element(&format!("</{name}>"))? {
            Token::Close(found) if found == name => Ok(()),
            token => Err(PlistError::UnexpectedElement {
                expected: format!("</{name}>"),
                found: token.describe(),
            }),
        }
    }

    /// Reads the character data of a scalar element whose open tag was consumed.
    fn text_of(&mut self, name: &str) -> Result<String, PlistError> {
        match self.next_token()? {
            Token::Close(found) if found == name => Ok(String::new()),
            Token::Text(text) => {
                self.expect_close(name)?;
                Ok(decode_entities(text))
            }
            Token::Eof => Err(PlistError::UnexpectedEof(format!("<{name}>"))),
            token => Err(PlistError::UnexpectedElement {
                expected: format!("text or </{name}>"),
                found: token.describe(),
            }),
        }
    }

    fn parse_value(&mut self) -> Result<Value, PlistError> {
        let token = self.next_element("a value")?;
        self.value_from(token)
    }

    fn value_from(&mut self, token: Token<'a>) -> Result<Value, PlistError> {
        match token {
            Token::Open("string") => Ok(Value::String(self.text_of("string")?)),
            Token::Empty("string") => Ok(Value::String(String::new())),
            Token::Open("integer") => {
                let text = self.text_of("integer")?;
                text.trim()
                    .parse()
                    .map(Value::Integer)
                    .map_err(|_| PlistError::InvalidValue { element: "integer", value: text })
            }
            Token::Open("real") => {
                let text = self.text_of("real")?;
                text.trim()
                    .parse()
                    .map(Value::Real)
                    .map_err(|_| PlistError::InvalidValue { element: "real", value: text })
            }
            Token::Empty("true") => Ok(Value::Boolean(true)),
            Token::Empty("false") => Ok(Value::Boolean(false)),
            Token::Open("true") => self.expect_close("true").map(|_| Value::Boolean(true)),
            Token::Open("false") => self.expect_close("false").map(|_| Value::Boolean(false)),
            Token::Open("date") => Ok(Value::Date(self.text_of("date")?.trim().to_string())),
            Token::Open("data") => {
                let text = self.text_of("data")?;
                Ok(Value::Data(text.split_whitespace().collect()))
            }
            Token::Empty("data") => Ok(Value::Data(String::new())),
            Token::Empty("array") => Ok(Value::Array(Vec::new())),
            Token::Open("array") => {
                let mut items = Vec::new();
                loop {
                    match self.next_element("</array>")? {
                        Token::Close("array") => break,
                        token => items.push(self.value_from(token)?),
                    }
                }
                Ok(Value::Array(items))
            }
            Token::Empty("dict") => Ok(Value::Dictionary(Dictionary::new())),
            Token::Open("dict") => {
                let mut dict = Dictionary::new();
                loop {
                    let key = match self.next_element("</dict>")? {
                        Token::Close("dict") => break,
                        Token::Open("key") => self.text_of("key")?,
                        Token::Empty("key") => String::new(),
                        token => {
                            return Err(PlistError::UnexpectedElement {
                                expected: "<key> or </dict>".to_string(),
                                found: token.describe(),
                            });
                        }
                    };
                    let value = self.parse_value()?;
                    dict.insert(key, value);
                }
                Ok(Value::Dictionary(dict))
            }
            Token::Eof => Err(PlistError::UnexpectedEof("a value".to_string())),
            token => Err(PlistError::UnexpectedElement {
                expected: "a value element".to_string(),
                found: token.describe(),
            }),
        }
    }
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').and_then(|semi| {
            let c = match &tail[1..semi] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                entity => entity
                    .strip_prefix("#x")
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            }?;
            Some((c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>ApplicationIdentifierPrefix</key>
	<array>
		<string>AAAA</string>
	</array>
	<key>CreationDate</key>
	<date>2012-10-01T12:00:00Z</date>
	<key>DeveloperCertificates</key>
	<array>
		<data>
		MIIFoTCCBImgAwIBAgII
		</data>
	</array>
	<key>Name</key>
	<string>iOS Team Provisioning Profile: *</string>
	<key>TimeToLive</key>
	<integer>365</integer>
	<!-- trailing comment -->
	<key>Entitlements</key>
	<dict>
		<key>get-task-allow</key>
		<true/>
	</dict>
</dict>
</plist>"#;

    #[test]
    fn test_reads_profile_shaped_document() {
        let value = from_xml_str(PROFILE).expect("parse");
        let dict = value.as_dictionary().expect("dict");

        assert_eq!(dict.get("Name").and_then(Value::as_str), Some("iOS Team Provisioning Profile: *"));
        assert_eq!(dict.get("TimeToLive"), Some(&Value::Integer(365)));
        assert_eq!(dict.get("CreationDate"), Some(&Value::Date("2012-10-01T12:00:00Z".into())));
        assert_eq!(
            dict.get("DeveloperCertificates"),
            Some(&Value::Array(vec![Value::Data("MIIFoTCCBImgAwIBAgII".into())]))
        );
        let entitlements = dict.get("Entitlements").and_then(Value::as_dictionary).expect("nested");
        assert_eq!(entitlements.get("get-task-allow"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn test_reads_embedded_payload() {
        let mut blob = vec![0x30, 0x82, 0x1d, 0x7a, 0x06, 0x09, 0xff, 0x00];
        blob.extend_from_slice(PROFILE.as_bytes());
        blob.extend_from_slice(&[0xa0, 0x82, 0x0c, 0x00, 0xfe]);

        let value = from_embedded_bytes(&blob).expect("parse");
        assert!(value.as_dictionary().expect("dict").contains_key("ApplicationIdentifierPrefix"));
    }

    #[test]
    fn test_embedded_without_plist_is_not_found() {
        assert_eq!(from_embedded_bytes(b"\x00\x01binary"), Err(PlistError::NotFound));
    }

    #[test]
    fn test_decodes_entities() {
        let value = from_xml_str("<plist><string>a &amp; b &lt;c&gt; &#65;&#x42; &bogus</string></plist>")
            .expect("parse");
        assert_eq!(value, Value::String("a & b <c> AB &bogus".into()));
    }

    #[test]
    fn test_rejects_bad_integer() {
        let err = from_xml_str("<plist><integer>twelve</integer></plist>").unwrap_err();
        assert_eq!(err, PlistError::InvalidValue { element: "integer", value: "twelve".into() });
    }

    #[test]
    fn test_rejects_dict_without_key() {
        let err = from_xml_str("<plist><dict><string>x</string></dict></plist>").unwrap_err();
        assert!(matches!(err, PlistError::UnexpectedElement { .. }));
    }

    #[test]
    fn test_rejects_truncated_document() {
        let err = from_xml_str("<plist><array><string>x</string>").unwrap_err();
        assert!(matches!(err, PlistError::UnexpectedEof(_)));
    }

    #[test]
    fn test_rejects_unterminated_tag() {
        let err = from_xml_str("<plist><array").unwrap_err();
        assert!(matches!(err, PlistError::Unterminated(_)));
    }

    #[test]
    fn test_writer_output_reads_back() {
        let mut dict = Dictionary::new();
        dict.insert("UIDeviceFamily", Value::from(vec!["1", "2"]));
        dict.insert("Empty", Value::Array(Vec::new()));
        dict.insert("Nested", Dictionary::new());
        dict.insert("Flag", true);
        let value = Value::Dictionary(dict);

        assert_eq!(from_xml_str(&crate::to_xml_string(&value)).expect("parse"), value);
    }
}
