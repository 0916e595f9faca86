//! Set member resolution
//!
//! Alma lists set members page by page. Members that carry an API link are
//! turned into the full ancestor chain of ids (`.../bibs/99/holdings/22` ->
//! `99,22`); members without a link fall back to their `<id>`, which is only
//! enough for top-level records.

use quick_xml::events::Event;
use quick_xml::Reader;

use almapipo_common::types::RecordId;

use super::ApiError;
use crate::xml::XmlError;

/// Page size used when listing members
pub const PAGE_SIZE: usize = 100;

/// One `<member>` of a set page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetMember {
    pub link: Option<String>,
    pub id: Option<String>,
}

pub fn members_path(set_id: &str, limit: usize, offset: usize) -> String {
    format!("/conf/sets/{set_id}/members?limit={limit}&offset={offset}")
}

/// Number of members reported by the first page
pub fn total_record_count(payload: &str) -> Result<usize, ApiError> {
    let count = crate::xml::find_attribute(payload, "members", "total_record_count")?
        .ok_or_else(|| ApiError::invalid_response("members without total_record_count"))?;

    count
        .trim()
        .parse()
        .map_err(|_| ApiError::invalid_response(format!("invalid total_record_count '{count}'")))
}

/// All `<member>` elements of one page, in document order
pub fn parse_members(payload: &str) -> Result<Vec<SetMember>, XmlError> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut members = Vec::new();
    let mut current: Option<SetMember> = None;
    let mut in_id = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"member" => {
                let link = e
                    .try_get_attribute("link")?
                    .map(|a| a.unescape_value().map(|v| v.into_owned()))
                    .transpose()?;
                current = Some(SetMember { link, id: None });
            },
            Event::Empty(e) if e.name().as_ref() == b"member" => {
                let link = e
                    .try_get_attribute("link")?
                    .map(|a| a.unescape_value().map(|v| v.into_owned()))
                    .transpose()?;
                members.push(SetMember { link, id: None });
            },
            Event::Start(e) if e.name().as_ref() == b"id" && current.is_some() => in_id = true,
            Event::Text(t) if in_id => {
                if let Some(member) = current.as_mut() {
                    member.id = Some(t.unescape()?.into_owned());
                }
            },
            Event::End(e) if e.name().as_ref() == b"id" => in_id = false,
            Event::End(e) if e.name().as_ref() == b"member" => {
                if let Some(member) = current.take() {
                    members.push(member);
                }
            },
            _ => {},
        }
    }

    Ok(members)
}

/// Record id of one member.
///
/// A link must start with `base_url`; the first path segment after it names
/// the api and is dropped, and the ids are taken from the end of the path,
/// every second segment.
pub fn member_record_id(member: &SetMember, base_url: &str) -> Result<RecordId, ApiError> {
    match (&member.link, &member.id) {
        (Some(link), _) if !link.is_empty() => {
            let path = link.strip_prefix(base_url).ok_or_else(|| {
                ApiError::invalid_response(format!(
                    "member link '{link}' does not start with base URL '{base_url}'"
                ))
            })?;
            let path = path.split(['?', '#']).next().unwrap_or_default();
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

            let ids: Vec<&str> = segments
                .iter()
                .enumerate()
                .skip(1)
                .filter(|(i, _)| (segments.len() - 1 - i) % 2 == 0)
                .map(|(_, s)| *s)
                .collect();
            if ids.is_empty() {
                return Err(ApiError::invalid_response(format!(
                    "member link '{link}' contains no record id"
                )));
            }

            RecordId::new(ids).map_err(|e| ApiError::invalid_response(e.to_string()))
        },
        (_, Some(id)) => {
            RecordId::new([id.as_str()]).map_err(|e| ApiError::invalid_response(e.to_string()))
        },
        _ => Err(ApiError::invalid_response("member without link or id")),
    }
}
