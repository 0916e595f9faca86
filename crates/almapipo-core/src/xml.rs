//! XML helpers for Alma records
//!
//! Alma exchanges records as small XML documents. These helpers cover the
//! few operations the pipeline needs: a normalised form for comparing what
//! was sent with what came back, two edits usable as PUT transforms, and
//! the attribute lookup that reads a set's member count.

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Invalid XML: {0}")]
pub struct XmlError(String);

impl From<quick_xml::Error> for XmlError {
    fn from(err: quick_xml::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for XmlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self(err.to_string())
    }
}

impl From<std::io::Error> for XmlError {
    fn from(err: std::io::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for XmlError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self(err.to_string())
    }
}

/// Canonical text of a document.
///
/// Drops the declaration, comments, processing instructions and whitespace
/// between elements, trims text content and writes self-closing elements as
/// an open/close pair.
pub fn normalize(payload: &str) -> Result<String, XmlError> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);
    let mut writer = Writer::new(Vec::new());

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {},
            Event::Empty(e) => {
                writer.write_event(Event::Start(e.borrow()))?;
                writer.write_event(Event::End(e.to_end()))?;
            },
            event => writer.write_event(event)?,
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}

/// Remove every direct child of the root element named `tag`.
///
/// Returns the payload unchanged when no such child exists and `None` when
/// the payload is not well-formed.
pub fn remove_element(payload: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(payload);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut skip = 0usize;
    let mut removed = false;

    loop {
        let event = reader.read_event().ok()?;
        if matches!(event, Event::Eof) {
            break;
        }

        if skip > 0 {
            match event {
                Event::Start(_) => skip += 1,
                Event::End(_) => skip -= 1,
                _ => {},
            }
            continue;
        }

        match &event {
            Event::Start(e) if depth == 1 && e.name().as_ref() == tag.as_bytes() => {
                skip = 1;
                removed = true;
                continue;
            },
            Event::Empty(e) if depth == 1 && e.name().as_ref() == tag.as_bytes() => {
                removed = true;
                continue;
            },
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {},
        }

        writer.write_event(event).ok()?;
    }

    if !removed {
        return Some(payload.to_string());
    }
    String::from_utf8(writer.into_inner()).ok()
}

/// Replace the text of every direct child of the root element named `tag`.
///
/// Returns the payload unchanged when no such child exists and `None` when
/// the payload is not well-formed.
pub fn replace_text(payload: &str, tag: &str, value: &str) -> Option<String> {
    let mut reader = Reader::from_str(payload);
    let mut writer = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut skip = 0usize;
    let mut replaced = false;

    loop {
        let event = reader.read_event().ok()?;
        if matches!(event, Event::Eof) {
            break;
        }

        if skip > 0 {
            match event {
                Event::Start(_) => skip += 1,
                Event::End(_) => skip -= 1,
                _ => {},
            }
            continue;
        }

        match &event {
            Event::Start(e) | Event::Empty(e)
                if depth == 1 && e.name().as_ref() == tag.as_bytes() =>
            {
                if matches!(event, Event::Start(_)) {
                    skip = 1;
                }
                writer.write_event(Event::Start(e.borrow())).ok()?;
                writer.write_event(Event::Text(BytesText::new(value))).ok()?;
                writer.write_event(Event::End(e.to_end())).ok()?;
                replaced = true;
                continue;
            },
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {},
        }

        writer.write_event(event).ok()?;
    }

    if !replaced {
        return Some(payload.to_string());
    }
    String::from_utf8(writer.into_inner()).ok()
}

/// Value of `attribute` on the first element named `tag`
pub fn find_attribute(payload: &str, tag: &str, attribute: &str) -> Result<Option<String>, XmlError> {
    let mut reader = Reader::from_str(payload);

    loop {
        match reader.read_event()? {
            Event::Eof => return Ok(None),
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == tag.as_bytes() => {
                return match e.try_get_attribute(attribute)? {
                    Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
                    None => Ok(None),
                };
            },
            _ => {},
        }
    }
}
