use crate::db::payloads::QuestionPayload;

/// Letters A to J, one per variant.
pub(crate) const VARIANT_LABELS: [&str; 10] = ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J"];

/// Display label of the option at `index`: A..Z, then AA, AB, ...
pub(crate) fn option_label(index: usize) -> String {
    let mut label = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        label.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    label.reverse();
    String::from_utf8_lossy(&label).into_owned()
}

/// Key for the payload as currently ordered. Returns `None` when a closed
/// option question has nothing marked correct.
pub(crate) fn answer_key(payload: &QuestionPayload) -> Option<String> {
    match payload {
        QuestionPayload::SingleChoice(choices) | QuestionPayload::MultiChoice(choices) => {
            let labels: Vec<String> = choices
                .options
                .iter()
                .enumerate()
                .filter(|(_, option)| option.is_correct)
                .map(|(index, _)| option_label(index))
                .collect();
            if labels.is_empty() {
                None
            } else {
                Some(labels.join(","))
            }
        }
        QuestionPayload::TrueFalse(key) => Some(key.correct.normalized()),
        _ => Some(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::payloads::{ChoiceOptions, QuestionOption, TrueFalseKey, TruthValue};

    fn choices(correct: &[bool]) -> ChoiceOptions {
        ChoiceOptions {
            options: correct
                .iter()
                .enumerate()
                .map(|(index, is_correct)| QuestionOption {
                    id: format!("o{index}"),
                    text: format!("option {index}"),
                    is_correct: *is_correct,
                })
                .collect(),
        }
    }

    #[test]
    fn labels_are_spreadsheet_style() {
        assert_eq!(option_label(0), "A");
        assert_eq!(option_label(25), "Z");
        assert_eq!(option_label(26), "AA");
    }

    #[test]
    fn multi_choice_key_joins_labels() {
        let payload = QuestionPayload::MultiChoice(choices(&[true, false, true, false]));
        assert_eq!(answer_key(&payload).as_deref(), Some("A,C"));
    }

    #[test]
    fn true_false_key_is_normalised_text() {
        let payload = QuestionPayload::TrueFalse(TrueFalseKey {
            correct: TruthValue::Text("TRUE".to_string()),
        });
        assert_eq!(answer_key(&payload).as_deref(), Some("true"));
    }

    #[test]
    fn no_correct_option_yields_none() {
        let payload = QuestionPayload::SingleChoice(choices(&[false, false]));
        assert_eq!(answer_key(&payload), None);
    }
}
