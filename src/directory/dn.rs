//! Distinguished name decoding for `{attr.cn}` style place-holders

/// One attribute type/value assertion of a relative distinguished name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ava {
    pub attr: String,
    pub value: String,
}

/// Parse a DN into its AVAs, leftmost RDN first.
///
/// Multi-valued RDNs (`cn=a+uid=b`) are flattened in order. Escapes of the
/// form `\,` and `\2c` are decoded.
pub fn parse_dn(dn: &str) -> Result<Vec<Ava>, String> {
    if dn.trim().is_empty() {
        return Err("empty DN".to_string());
    }

    let mut avas = Vec::new();
    for rdn in split_unescaped(dn, ',') {
        for ava in split_unescaped(&rdn, '+') {
            let (attr, value) = split_ava(&ava)?;
            avas.push(Ava { attr, value });
        }
    }
    Ok(avas)
}

/// First value of `component` in `dn`, matching the attribute type
/// case-insensitively.
pub fn dn_component(dn: &str, component: &str) -> Result<Option<String>, String> {
    Ok(parse_dn(dn)?
        .into_iter()
        .find(|ava| ava.attr.eq_ignore_ascii_case(component))
        .map(|ava| ava.value))
}

/// Lowercased `attr=value` sequence used to compare DNs regardless of case
/// and spacing.
pub fn normalize_dn(dn: &str) -> Result<Vec<String>, String> {
    if dn.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(parse_dn(dn)?
        .into_iter()
        .map(|ava| format!("{}={}", ava.attr.to_lowercase(), ava.value.to_lowercase()))
        .collect())
}

fn split_unescaped(input: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            current.push(c);
            if let Some(next) = chars.next() {
                current.push(next);
            }
        } else if c == separator {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn split_ava(ava: &str) -> Result<(String, String), String> {
    let Some((attr, raw_value)) = ava.split_once('=') else {
        return Err(format!("missing '=' in {:?}", ava.trim()));
    };

    let attr = attr.trim();
    if attr.is_empty()
        || !attr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(format!("invalid attribute type {:?}", attr));
    }

    Ok((attr.to_string(), unescape(raw_value.trim())?))
}

fn unescape(raw: &str) -> Result<String, String> {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let Some(first) = chars.next() else {
            return Err("trailing backslash".to_string());
        };
        match (first.to_digit(16), chars.peek().and_then(|c| c.to_digit(16))) {
            (Some(high), Some(low)) => {
                chars.next();
                bytes.push((high * 16 + low) as u8);
            }
            _ => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(first.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    String::from_utf8(bytes).map_err(|_| "invalid UTF-8 escape".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_dn() {
        let avas = parse_dn("cn=alice,ou=people,dc=acme,dc=tld").unwrap();
        assert_eq!(avas.len(), 4);
        assert_eq!(avas[0].attr, "cn");
        assert_eq!(avas[0].value, "alice");
        assert_eq!(avas[3].value, "tld");
    }

    #[test]
    fn test_escaped_separators() {
        let avas = parse_dn(r"cn=Smith\, John+uid=js,ou=people").unwrap();
        assert_eq!(avas[0].value, "Smith, John");
        assert_eq!(avas[1].attr, "uid");
        assert_eq!(avas[1].value, "js");

        assert_eq!(parse_dn(r"cn=a\2cb").unwrap()[0].value, "a,b");
    }

    #[test]
    fn test_component_lookup_is_case_insensitive() {
        assert_eq!(
            dn_component("CN=Bob,OU=People", "cn").unwrap(),
            Some("Bob".to_string())
        );
        assert_eq!(dn_component("cn=bob,ou=people", "l").unwrap(), None);
    }

    #[test]
    fn test_invalid_dn() {
        assert!(parse_dn("alice").is_err());
        assert!(parse_dn("").is_err());
        assert!(parse_dn("=x,ou=people").is_err());
    }

    #[test]
    fn test_normalize_ignores_case_and_spacing() {
        assert_eq!(
            normalize_dn("CN=Bob, OU=People").unwrap(),
            normalize_dn("cn=bob,ou=people").unwrap()
        );
        assert!(normalize_dn("").unwrap().is_empty());
    }
}
