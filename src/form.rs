//! HTML form parsing
//!
//! Login and review submissions need the fields the page renders into its
//! forms (hidden hashes, honeypot inputs, field names that change between
//! deployments). [`Form`] captures every field in document order so the
//! submission can replay them with the user's values merged in.

use scraper::{ElementRef, Html};

use crate::error::{Error, Result};
use crate::extract::selector;

/// One input, select or textarea of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub id: Option<String>,
    /// `type` attribute for inputs, `select` / `textarea` otherwise.
    pub kind: String,
    pub value: String,
}

impl Field {
    pub fn is_hidden(&self) -> bool {
        self.kind == "hidden"
    }
}

/// A parsed HTML form
#[derive(Debug, Clone, Default)]
pub struct Form {
    pub name: Option<String>,
    pub class: Option<String>,
    /// Form action URL (may be relative)
    pub action: String,
    pub method: String,
    /// Named fields in document order. Inputs without a name are never
    /// submitted and are skipped.
    pub fields: Vec<Field>,
}

impl Form {
    fn from_element(form: ElementRef<'_>) -> Result<Self> {
        let inputs = selector("input, select, textarea")?;
        let options = selector("option")?;

        let attr = |name: &str| form.value().attr(name).map(str::to_string);
        let mut parsed = Form {
            name: attr("name"),
            class: attr("class"),
            action: attr("action").unwrap_or_default(),
            method: attr("method").unwrap_or_else(|| "get".into()).to_uppercase(),
            ..Form::default()
        };

        for element in form.select(&inputs) {
            let tag = element.value().name();
            let (kind, value) = match tag {
                "select" => {
                    // Selected option, else the first one
                    let mut chosen = None;
                    for option in element.select(&options) {
                        let value = option.value().attr("value").unwrap_or("").to_string();
                        if option.value().attr("selected").is_some() {
                            chosen = Some(value);
                            break;
                        }
                        chosen.get_or_insert(value);
                    }
                    ("select".to_string(), chosen.unwrap_or_default())
                }
                "textarea" => ("textarea".to_string(), element.text().collect()),
                _ => (
                    element.value().attr("type").unwrap_or("text").to_lowercase(),
                    element.value().attr("value").unwrap_or("").to_string(),
                ),
            };

            let Some(name) = element.value().attr("name").filter(|n| !n.is_empty()) else {
                continue;
            };
            parsed.fields.push(Field {
                name: name.to_string(),
                id: element.value().attr("id").map(str::to_string),
                kind,
                value,
            });
        }

        Ok(parsed)
    }

    /// Parse all forms from HTML
    pub fn parse_all(html: &str) -> Result<Vec<Self>> {
        let document = Html::parse_document(html);
        let forms = selector("form")?;
        document.select(&forms).map(Self::from_element).collect()
    }

    /// Find a form by its `name` attribute.
    pub fn find_by_name(html: &str, name: &str) -> Result<Option<Self>> {
        Ok(Self::parse_all(html)?
            .into_iter()
            .find(|f| f.name.as_deref() == Some(name)))
    }

    /// Find the first form carrying `class`.
    pub fn find_by_class(html: &str, class: &str) -> Result<Option<Self>> {
        Ok(Self::parse_all(html)?.into_iter().find(|f| {
            f.class
                .as_deref()
                .is_some_and(|c| c.split_whitespace().any(|c| c == class))
        }))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_id(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id.as_deref() == Some(id))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value.as_str())
    }

    /// Like [`Form::value`], failing with [`Error::Parse`] when absent.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.value(name).ok_or_else(|| {
            Error::Parse(format!(
                "form {} has no field {name:?}",
                self.name.as_deref().unwrap_or(&self.action)
            ))
        })
    }

    /// Hidden fields only
    pub fn hidden_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_hidden())
    }

    /// Resolve action URL against a base URL
    pub fn resolve_action(&self, base_url: &str) -> Result<String> {
        if self.action.is_empty() {
            return Ok(base_url.to_string());
        }
        let base = url::Url::parse(base_url)?;
        Ok(base.join(&self.action)?.to_string())
    }
}
