// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Render markform fields as their control lines.
// Author: Lukas Bower

//! Render a record field as its markform control line.

use chrono::SecondsFormat;

use super::{Control, Record, Value};

/// Render the control line for `name`, reflecting its current value.
/// Unknown field names render as the empty string.
#[must_use]
pub fn marshal(record: &Record, name: &str) -> String {
    let Some(field) = record.get(name) else {
        return String::new();
    };
    let req = if field.required { "*" } else { "" };

    match (&field.control, &field.value) {
        (Control::Text { limit }, Value::Text(value)) => {
            let (value, suffix) = match limit {
                Some(limit) => (clip(value, *limit), format!("[{limit}]")),
                None => (value.clone(), String::new()),
            };
            format!("{name}{req} = {value}___{suffix}")
        }
        (Control::Flag, Value::Flag(value)) => {
            let mark = if *value { "[x]" } else { "[]" };
            format!("{name}{req} = {mark}")
        }
        (Control::Radio { options }, Value::Choice(choice)) => {
            let rendered: Vec<String> = options
                .iter()
                .map(|option| {
                    let mark = if option == choice { "(x)" } else { "()" };
                    format!("{mark} {option}")
                })
                .collect();
            format!("{name}{req} = {}", rendered.join(" "))
        }
        (Control::Check { options }, Value::Picks(picks)) => {
            let rendered: Vec<String> = options
                .iter()
                .map(|option| {
                    let mark = if picks.contains(option) { "[x]" } else { "[]" };
                    format!("{mark} {option}")
                })
                .collect();
            format!("{name}{req} = {}", rendered.join(" "))
        }
        (Control::List, Value::Items(items)) => {
            let mut line = format!("{name}{req} =");
            for item in items {
                line.push_str(" ,, ");
                line.push_str(item);
            }
            line.push_str(" ,, ___");
            line
        }
        (Control::Time, Value::Time(value)) => match value {
            Some(time) => format!(
                "{name}{req} = {}",
                time.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            None => format!("{name}{req} = "),
        },
        // A value that does not fit its control renders as nothing, like
        // an unknown field.
        _ => String::new(),
    }
}

fn clip(value: &str, limit: usize) -> String {
    value.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::super::Field;
    use super::*;
    use chrono::{DateTime, Utc};

    #[test]
    fn text_fields() {
        let record = Record::new()
            .field("textField", Field::text("some value"))
            .field("textFieldLimited", Field::text_limited(10, "some value"))
            .field("textFieldRequired", Field::text("required").required());

        assert_eq!(marshal(&record, "textField"), "textField = some value___");
        assert_eq!(
            marshal(&record, "textFieldLimited"),
            "textFieldLimited = some value___[10]"
        );
        assert_eq!(
            marshal(&record, "textFieldRequired"),
            "textFieldRequired* = required___"
        );
    }

    #[test]
    fn long_text_is_clipped_to_its_limit() {
        let record =
            Record::new().field("textFieldLimited", Field::text_limited(10, "same value longer"));
        assert_eq!(
            marshal(&record, "textFieldLimited"),
            "textFieldLimited = same value___[10]"
        );
    }

    #[test]
    fn multi_line_text_is_preserved() {
        let record = Record::new().field("textField", Field::text("line1\nline2"));
        assert_eq!(marshal(&record, "textField"), "textField = line1\nline2___");
    }

    #[test]
    fn flags() {
        let record = Record::new()
            .field("checkbox", Field::flag(true))
            .field("unchecked", Field::flag(false))
            .field("requiredcheckbox", Field::flag(true).required());

        assert_eq!(marshal(&record, "checkbox"), "checkbox = [x]");
        assert_eq!(marshal(&record, "unchecked"), "unchecked = []");
        assert_eq!(marshal(&record, "requiredcheckbox"), "requiredcheckbox* = [x]");
    }

    #[test]
    fn radio_marks_the_selected_option() {
        let record = Record::new()
            .field("radio", Field::radio(&["the fox", "hare", "other"], "the fox"))
            .field(
                "requiredRadio",
                Field::radio(&["bard", "troll", "newt"], "troll").required(),
            );

        assert_eq!(marshal(&record, "radio"), "radio = (x) the fox () hare () other");
        assert_eq!(
            marshal(&record, "requiredRadio"),
            "requiredRadio* = () bard (x) troll () newt"
        );
    }

    #[test]
    fn check_marks_every_pick() {
        let record = Record::new().field(
            "check",
            Field::check(
                &["value1", "value 2", "some other value"],
                &["value1", "some other value"],
            ),
        );
        assert_eq!(
            marshal(&record, "check"),
            "check = [x] value1 [] value 2 [x] some other value"
        );
    }

    #[test]
    fn lists_end_with_the_insertion_slot() {
        let record = Record::new()
            .field("list", Field::list(&["value1", "another value", "something else"]))
            .field("empty", Field::list(&[]))
            .field("requiredList", Field::list(&["value"]).required());

        assert_eq!(
            marshal(&record, "list"),
            "list = ,, value1 ,, another value ,, something else ,, ___"
        );
        assert_eq!(marshal(&record, "empty"), "empty = ,, ___");
        assert_eq!(marshal(&record, "requiredList"), "requiredList* = ,, value ,, ___");
    }

    #[test]
    fn timestamps_render_rfc3339() {
        let when: DateTime<Utc> = "2010-01-02T15:04:05Z".parse().unwrap();
        let record = Record::new()
            .field("DateOfBirth", Field::time(Some(when)))
            .field("Unset", Field::time(None));

        assert_eq!(marshal(&record, "DateOfBirth"), "DateOfBirth = 2010-01-02T15:04:05Z");
        assert_eq!(marshal(&record, "Unset"), "Unset = ");
    }

    #[test]
    fn unknown_fields_render_empty() {
        let record = Record::new().field("a", Field::flag(true));
        assert_eq!(marshal(&record, "missing"), "");
    }
}
