use crate::error::ParseError;

pub const DELIMITER: u8 = b';';

/// A successfully parsed `<key>;<value>` line. Borrows the key from the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record<'a> {
    pub key: &'a str,
    pub value: f32,
}

impl<'a> Record<'a> {
    pub fn new(key: &'a str, value: f32) -> Self {
        Record { key, value }
    }
}

/// Splits a raw line on `;` and parses the value as `f32`.
///
/// Exactly two fields are required. Values that parse to NaN or infinity
/// (including overflow such as `1e50`) are rejected, so nothing non-finite
/// ever reaches the statistics fold.
pub fn parse_line(line: &[u8]) -> Result<Record<'_>, ParseError> {
    let semicolon = line
        .iter()
        .position(|&x| x == DELIMITER)
        .ok_or(ParseError::MissingDelimiter)?;
    let (key, val) = (&line[..semicolon], &line[semicolon + 1..]);
    if val.contains(&DELIMITER) {
        return Err(ParseError::TooManyFields);
    }
    if key.is_empty() {
        return Err(ParseError::EmptyKey);
    }
    let key = std::str::from_utf8(key).map_err(|_| ParseError::InvalidUtf8)?;
    let value = fast_float::parse::<f32, _>(val)
        .map_err(|_| ParseError::InvalidNumber(lossy(val)))?;
    if !value.is_finite() {
        return Err(ParseError::NonFinite(lossy(val)));
    }
    Ok(Record::new(key, value))
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(line: &[u8]) -> ParseError {
        parse_line(line).unwrap_err()
    }

    #[test]
    fn parses_valid_line() {
        assert_eq!(parse_line(b"Adana;23.4"), Ok(Record::new("Adana", 23.4)));
        let quoted = parse_line(b"St. John's;-5.0").unwrap();
        assert_eq!(quoted, Record::new("St. John's", -5.0));
        let accented = parse_line("İzmir;0".as_bytes()).unwrap();
        assert_eq!(accented, Record::new("İzmir", 0.0));
    }

    #[test]
    fn rejects_missing_delimiter() {
        assert_eq!(err(b"Adana"), ParseError::MissingDelimiter);
        assert_eq!(err(b""), ParseError::MissingDelimiter);
    }

    #[test]
    fn rejects_bad_number() {
        assert_eq!(err(b"Adana;abc"), ParseError::InvalidNumber("abc".into()));
        assert!(matches!(err(b"Adana;"), ParseError::InvalidNumber(_)));
        assert!(matches!(err(b"Adana;12.3x"), ParseError::InvalidNumber(_)));
    }

    #[test]
    fn rejects_extra_fields_and_empty_key() {
        assert_eq!(err(b"Adana;1.0;2.0"), ParseError::TooManyFields);
        assert_eq!(err(b";1.0"), ParseError::EmptyKey);
    }

    #[test]
    fn rejects_invalid_utf8_key() {
        assert_eq!(err(b"\xff\xfe;1.0"), ParseError::InvalidUtf8);
    }

    #[test]
    fn rejects_non_finite() {
        assert!(matches!(err(b"Adana;nan"), ParseError::NonFinite(_)));
        assert!(matches!(err(b"Adana;inf"), ParseError::NonFinite(_)));
        assert!(matches!(err(b"Adana;1e50"), ParseError::NonFinite(_)));
    }
}
