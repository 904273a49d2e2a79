// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Read edited markform documents back into their records.
// Author: Lukas Bower

//! Parse an edited markdown document back into a record.
//!
//! The document is reduced to a sequence of literal blocks (headings,
//! paragraphs, list items, fenced code) and horizontal rules. Blocks
//! matching `Field = rest` are interpreted per the record's control for
//! that field. Free text missing its `___` terminator keeps consuming the
//! following blocks until a literal `___`, another control line, or a
//! horizontal rule. Unknown fields and malformed lines are skipped.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex::Regex;

use super::{Control, Record, Value};

static FORM_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)(\w+)(\*?) =(.*)").expect("form pattern"));

/// One literal unit of the parsed document.
#[derive(Debug, PartialEq, Eq)]
enum Block {
    /// Heading, paragraph or list-item text with soft breaks as newlines.
    Text(String),
    /// Fenced or indented code content, excluded from control matching.
    Code(String),
    /// A horizontal rule; the hard boundary for free-text collection.
    Rule,
}

fn literal_blocks(doc: &str) -> Vec<Block> {
    fn flush(text: &mut String, blocks: &mut Vec<Block>) {
        if !text.is_empty() {
            blocks.push(Block::Text(std::mem::take(text)));
        }
    }

    let mut blocks = Vec::new();
    let mut text = String::new();
    let mut code = String::new();
    let mut in_code = false;

    for event in Parser::new(doc) {
        match event {
            Event::Start(Tag::CodeBlock(_)) => {
                flush(&mut text, &mut blocks);
                in_code = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                blocks.push(Block::Code(std::mem::take(&mut code)));
                in_code = false;
            }
            Event::Start(Tag::Paragraph | Tag::Heading { .. } | Tag::Item)
            | Event::End(TagEnd::Paragraph | TagEnd::Heading(_) | TagEnd::Item) => {
                flush(&mut text, &mut blocks);
            }
            Event::Text(chunk) => {
                if in_code {
                    code.push_str(&chunk);
                } else {
                    text.push_str(&chunk);
                }
            }
            Event::Code(chunk) => text.push_str(&chunk),
            Event::SoftBreak | Event::HardBreak => text.push('\n'),
            Event::Rule => {
                flush(&mut text, &mut blocks);
                blocks.push(Block::Rule);
            }
            _ => {}
        }
    }
    flush(&mut text, &mut blocks);
    blocks
}

/// Apply an edited document to `record`. Only fields present in both the
/// document and the record change; nothing here ever fails the caller.
pub fn unmarshal(doc: &str, record: &mut Record) {
    let blocks = literal_blocks(doc);

    for (idx, block) in blocks.iter().enumerate() {
        let Block::Text(text) = block else { continue };
        let Some(caps) = FORM_VAR.captures(text) else { continue };
        let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
        let value = caps.get(3).map_or("", |m| m.as_str()).trim().to_string();

        let Some(field) = record.get(&name) else { continue };
        let new_value = match field.control.clone() {
            Control::Flag => {
                if value.starts_with("[x]") {
                    Some(Value::Flag(true))
                } else if value.starts_with("[]") {
                    Some(Value::Flag(false))
                } else {
                    None
                }
            }
            Control::Text { limit } => {
                let mut collected = match value.find("___") {
                    Some(end) => value[..end].to_string(),
                    None => collect_free_text(&value, &blocks[idx + 1..]),
                };
                if let Some(limit) = limit {
                    collected = collected.chars().take(limit).collect();
                }
                Some(Value::Text(collected.trim().to_string()))
            }
            Control::Radio { options } => options
                .iter()
                .find(|option| value.contains(&format!("(x) {option}")))
                .map(|option| Value::Choice(option.clone())),
            Control::Check { options } => {
                let picks: Vec<String> = options
                    .iter()
                    .filter(|option| value.contains(&format!("[x] {option}")))
                    .cloned()
                    .collect();
                Some(Value::Picks(picks))
            }
            Control::List => {
                let items: Vec<String> = value
                    .split(",,")
                    .map(str::trim)
                    .filter(|item| !item.is_empty() && *item != "___")
                    .map(str::to_string)
                    .collect();
                Some(Value::Items(items))
            }
            Control::Time => match DateTime::parse_from_rfc3339(value.trim()) {
                Ok(time) => Some(Value::Time(Some(time.with_timezone(&Utc)))),
                // An unparseable date leaves the field untouched.
                Err(_) => None,
            },
        };

        if let (Some(new_value), Some(field)) = (new_value, record.get_mut(&name)) {
            field.value = new_value;
        }
    }
}

/// Gather free text spilling past its control line. Stops at a horizontal
/// rule, at the `___` terminator, or at the next control line.
fn collect_free_text(initial: &str, rest: &[Block]) -> String {
    let mut collected = initial.to_string();
    for block in rest {
        let chunk = match block {
            Block::Rule => break,
            Block::Code(code) => code.as_str(),
            Block::Text(text) => {
                if FORM_VAR.is_match(text) && !text.contains("___") {
                    break;
                }
                text.as_str()
            }
        };
        match chunk.find("___") {
            Some(end) => {
                push_chunk(&mut collected, &chunk[..end]);
                break;
            }
            None => push_chunk(&mut collected, chunk),
        }
    }
    collected
}

fn push_chunk(collected: &mut String, chunk: &str) {
    if !collected.is_empty() && !collected.ends_with('\n') && !chunk.is_empty() {
        collected.push('\n');
    }
    collected.push_str(chunk);
}

#[cfg(test)]
mod tests {
    use super::super::Field;
    use super::*;
    use chrono::SecondsFormat;

    fn person() -> Record {
        Record::new()
            .field("Name", Field::text_limited(50, "").required())
            .field("Gender", Field::radio(&["male", "female"], "").required())
            .field("Student", Field::flag(false).required())
            .field("Affiliations", Field::list(&[]))
            .field("Description", Field::text(""))
            .field(
                "Education",
                Field::check(&["elementary", "secondary", "post-secondary"], &[]),
            )
            .field("DateOfBirth", Field::time(None))
    }

    #[test]
    fn full_document_round_trips_every_control() {
        let document = "\
# Name* = John Doe___[50]  - Personal Information

Please ensure that the information is entered correctly. If you have any
questions you can email the [support team](mailto:support@example.com).

Description = Conscientious
student___

* Gender* = (x) male () female
* Student* = [x]
* Affiliations = ,, Chess Club ,, ___
* Education = [x] elementary [x] secondary [] post-secondary
* DateOfBirth = 2010-01-02T15:04:05Z

Save this file to record any changes to the person record.
";

        let mut record = person();
        unmarshal(document, &mut record);

        assert_eq!(record.text_value("Name"), Some("John Doe"));
        assert_eq!(record.text_value("Gender"), Some("male"));
        assert_eq!(record.flag_value("Student"), Some(true));
        assert_eq!(record.items_value("Affiliations"), Some(&["Chess Club".to_string()][..]));
        assert_eq!(record.text_value("Description"), Some("Conscientious\nstudent"));
        assert_eq!(
            record.items_value("Education"),
            Some(&["elementary".to_string(), "secondary".to_string()][..])
        );
        let dob = record.time_value("DateOfBirth").expect("date parsed");
        assert_eq!(dob.to_rfc3339_opts(SecondsFormat::Secs, true), "2010-01-02T15:04:05Z");
    }

    #[test]
    fn free_text_collects_fenced_code_until_terminator() {
        let document = "\
Description =
```
Conscientious
student

* more info
```
___

* Student* = [x]
";
        let mut record = person();
        unmarshal(document, &mut record);
        assert_eq!(
            record.text_value("Description"),
            Some("Conscientious\nstudent\n\n* more info")
        );
        assert_eq!(record.flag_value("Student"), Some(true));
    }

    #[test]
    fn free_text_stops_at_a_horizontal_rule() {
        let document = "\
Description = spilled text

---

Student* = [x]
";
        let mut record = person();
        unmarshal(document, &mut record);
        assert_eq!(record.text_value("Description"), Some("spilled text"));
        assert_eq!(record.flag_value("Student"), Some(true));
    }

    #[test]
    fn unknown_fields_and_malformed_lines_are_ignored() {
        let document = "\
Nonexistent = value___

Gender* = neither box is checked

DateOfBirth = not-a-date
";
        let mut record = person();
        unmarshal(document, &mut record);
        assert_eq!(record.text_value("Gender"), Some(""));
        assert_eq!(record.time_value("DateOfBirth"), None);
    }

    #[test]
    fn marshal_then_unmarshal_round_trips() {
        use super::super::marshal;

        let original = Record::new()
            .field("State", Field::radio(&["open", "closed", "all"], "open"))
            .field("Labels", Field::list(&["bug", "help wanted"]))
            .field("Assignee", Field::text_limited(39, "octocat"))
            .field("Since", Field::time(Some("2010-01-02T15:04:05Z".parse().unwrap())));

        let document = format!(
            "# Issue filter\n\n{}\n\n{}\n\n{}\n\n{}\n",
            marshal(&original, "State"),
            marshal(&original, "Labels"),
            marshal(&original, "Assignee"),
            marshal(&original, "Since"),
        );

        let mut parsed = original.blank();
        unmarshal(&document, &mut parsed);
        assert_eq!(parsed, original);
    }
}
