use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codes;
use crate::{Error, Result};

/// Maximum number of keywords the LLM may return for one article.
pub const MAX_LLM_KEYWORDS: usize = 5;

/// Identifier of an article document: an ObjectId in hex form, or a plain string id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleId(pub String);

impl ArticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 3166-1 alpha-2 country code, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CountryCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_uppercase();
        if codes::is_country_code(&code) {
            Ok(Self(code))
        } else {
            Err(Error::Parse(format!("invalid ISO 3166-1 alpha-2 country code: {s:?}")))
        }
    }
}

impl TryFrom<String> for CountryCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CountryCode> for String {
    fn from(code: CountryCode) -> Self {
        code.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 639-1 language code, always lower case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn english() -> Self {
        Self("en".to_string())
    }

    pub fn is_english(&self) -> bool {
        self.0 == "en"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for LanguageCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_ascii_lowercase();
        if codes::is_language_code(&code) {
            Ok(Self(code))
        } else {
            Err(Error::Parse(format!("invalid ISO 639-1 language code: {s:?}")))
        }
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

impl fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Politics,
    Economy,
    Technology,
    Society,
    Culture,
    Sports,
    Environment,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Politics,
        Category::Economy,
        Category::Technology,
        Category::Society,
        Category::Culture,
        Category::Sports,
        Category::Environment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "POLITICS",
            Category::Economy => "ECONOMY",
            Category::Technology => "TECHNOLOGY",
            Category::Society => "SOCIETY",
            Category::Culture => "CULTURE",
            Category::Sports => "SPORTS",
            Category::Environment => "ENVIRONMENT",
        }
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::Parse(format!("unknown category: {s:?}")))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scraped news article as stored in the `articles` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobeArticle {
    pub id: ArticleId,
    pub title: String,
    pub title_translated: Option<String>,
    pub url: String,
    pub description: String,
    pub description_translated: Option<String>,
    pub date_published: DateTime<Utc>,
    pub provider: String,
    pub language: Option<LanguageCode>,
    pub content: String,
    pub origin_country: CountryCode,
    pub keywords: Vec<String>,
    pub source_api: String,
    pub schema_version: String,
    pub date_scraped: DateTime<Utc>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub authors: Option<Vec<String>>,
    #[serde(default)]
    pub related_countries: Option<Vec<CountryCode>>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub post_processed: bool,
}

/// Metadata extracted from an article by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmArticleData {
    pub category: Category,
    pub related_countries: Vec<CountryCode>,
    pub keywords: Vec<String>,
}

#[derive(Deserialize)]
struct RawLlmArticleData {
    category: String,
    #[serde(default)]
    related_countries: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
}

impl LlmArticleData {
    /// Parse and validate the JSON object returned by the model.
    pub fn from_json(output: &str) -> Result<Self> {
        let body = strip_code_fence(output);
        let raw: RawLlmArticleData = serde_json::from_str(body)
            .map_err(|e| Error::Parse(format!("LLM output is not valid article data ({e}): {output}")))?;

        let category = raw.category.parse::<Category>()?;
        let related_countries = raw
            .related_countries
            .iter()
            .map(|c| c.parse::<CountryCode>())
            .collect::<Result<Vec<_>>>()?;

        if raw.keywords.len() > MAX_LLM_KEYWORDS {
            return Err(Error::Parse(format!(
                "LLM returned {} keywords, at most {} allowed",
                raw.keywords.len(),
                MAX_LLM_KEYWORDS
            )));
        }

        Ok(Self {
            category,
            related_countries,
            keywords: raw.keywords,
        })
    }
}

fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => trimmed,
    }
}

/// An article enriched with LLM metadata and English title/description.
///
/// Construction guarantees `post_processed == true` and that the origin
/// country is not listed among the related countries.
#[derive(Debug, Clone, PartialEq)]
pub struct CuratedArticle {
    article: GlobeArticle,
    category: Category,
}

impl CuratedArticle {
    pub fn from_parts(
        article: GlobeArticle,
        llm: LlmArticleData,
        title_translated: String,
        description_translated: String,
    ) -> Self {
        let mut article = article;
        let related_countries = llm
            .related_countries
            .into_iter()
            .filter(|c| *c != article.origin_country)
            .collect();

        article.category = Some(llm.category.to_string());
        article.related_countries = Some(related_countries);
        article.keywords = llm.keywords;
        article.title_translated = Some(title_translated);
        article.description_translated = Some(description_translated);
        article.post_processed = true;

        Self {
            article,
            category: llm.category,
        }
    }

    pub fn id(&self) -> &ArticleId {
        &self.article.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn article(&self) -> &GlobeArticle {
        &self.article
    }

    pub fn related_countries(&self) -> &[CountryCode] {
        self.article.related_countries.as_deref().unwrap_or_default()
    }

    pub fn keywords(&self) -> &[String] {
        &self.article.keywords
    }

    pub fn title_translated(&self) -> &str {
        self.article.title_translated.as_deref().unwrap_or_default()
    }

    pub fn description_translated(&self) -> &str {
        self.article.description_translated.as_deref().unwrap_or_default()
    }

    pub fn into_article(self) -> GlobeArticle {
        self.article
    }
}

/// An article that could not be post-processed.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedArticle {
    pub article: GlobeArticle,
    pub failure_reason: String,
}

impl FailedArticle {
    pub fn new(article: GlobeArticle, failure_reason: impl Into<String>) -> Self {
        let failure_reason = failure_reason.into();
        let failure_reason = if failure_reason.trim().is_empty() {
            "unknown error".to_string()
        } else {
            failure_reason
        };
        Self {
            article,
            failure_reason,
        }
    }

    pub fn id(&self) -> &ArticleId {
        &self.article.id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens + rhs.input_tokens,
            output_tokens: self.output_tokens + rhs.output_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

impl fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input_tokens={}, output_tokens={}", self.input_tokens, self.output_tokens)
    }
}
