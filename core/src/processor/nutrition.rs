use super::{malformed, OutcomeBuilder, ProcessError, ProcessOutcome, Processor};
use crate::document::{Document, SourceKind};
use crate::loader::builtins::NutritionRow;

/// Template used when none is configured
pub const DEFAULT_NUTRITION_TEMPLATE: &str = "Food: {Food}. Calories: {Calories}. Protein: {Protein}g. \
Fat: {Fat}g. Carbohydrates: {Carbohydrates}g. Nutrition Density Score: {Nutrition Density}.";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Renders nutrition table rows through a `{Column}` template.
///
/// Each row becomes one document identified as `food_{row_index}`; the whole
/// row is kept as metadata. Rows lacking any column the template refers to are
/// skipped.
#[derive(Debug, Clone)]
pub struct NutritionProcessor {
    segments: Vec<Segment>,
}

impl Default for NutritionProcessor {
    fn default() -> Self {
        Self {
            segments: parse_template(DEFAULT_NUTRITION_TEMPLATE)
                .unwrap_or_else(|_| vec![Segment::Literal(DEFAULT_NUTRITION_TEMPLATE.into())]),
        }
    }
}

impl NutritionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a custom template, e.g. `"{Food} has {Calories} kcal"`.
    ///
    /// # Errors
    /// Fails on unbalanced braces or empty placeholders.
    pub fn with_template(template: &str) -> Result<Self, ProcessError> {
        Ok(Self {
            segments: parse_template(template)?,
        })
    }

    /// Column names the template refers to, in template order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    fn render(&self, row: &NutritionRow) -> Result<String, String> {
        let mut text = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => text.push_str(s),
                Segment::Field(name) => match row.get(name) {
                    Some(value) if !value.to_string().trim().is_empty() => {
                        text.push_str(&value.to_string());
                    }
                    _ => return Err(format!("missing field `{name}`")),
                },
            }
        }
        Ok(text)
    }
}

fn parse_template(template: &str) -> Result<Vec<Segment>, ProcessError> {
    let mut segments = vec![];
    let mut literal = String::new();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        match c {
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') | None => {
                            return Err(ProcessError::InvalidTemplate(format!(
                                "unclosed placeholder in `{template}`"
                            )))
                        }
                        Some(c) => name.push(c),
                    }
                }
                if name.trim().is_empty() {
                    return Err(ProcessError::InvalidTemplate(format!(
                        "empty placeholder in `{template}`"
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name));
            }
            '}' => {
                return Err(ProcessError::InvalidTemplate(format!(
                    "unmatched `}}` in `{template}`"
                )))
            }
            c => literal.push(c),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

impl Processor for NutritionProcessor {
    type Record = NutritionRow;

    fn source_kind(&self) -> SourceKind {
        SourceKind::Nutrition
    }

    fn process(&self, batch: &[NutritionRow]) -> ProcessOutcome {
        let mut outcome = OutcomeBuilder::new(SourceKind::Nutrition);
        for (index, row) in batch.iter().enumerate() {
            let document = self.render(row).map_err(malformed(index)).and_then(|text| {
                Document::new(
                    SourceKind::Nutrition,
                    format!("food_{index}"),
                    text,
                    row.clone(),
                )
                .map_err(malformed(index))
            });
            outcome.push(document);
        }
        outcome.finish()
    }
}
