//! Multi-key sorting of node sequences.
use crate::ast::Expression;
use crate::context::{Context, Dependencies, LastPosition};
use crate::datasource::TreeNode;
use crate::enumeration::{Enumeration, ExtentEnumeration, NodeEnumeration};
use crate::error::{Result, XPathError};
use crate::value::nodeset::NodeSetExtent;
use crate::value::string_to_number;
use std::cmp::Ordering;
use std::fmt;

/// A sort key value, prepared once per node.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Text(String),
    Number(f64),
}

/// Orders sort key values.
pub trait Comparer: fmt::Debug + Send + Sync {
    fn prepare(&self, value: String) -> SortKey {
        SortKey::Text(value)
    }

    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering;
}

fn texts<'k>(a: &'k SortKey, b: &'k SortKey) -> Option<(&'k str, &'k str)> {
    match (a, b) {
        (SortKey::Text(a), SortKey::Text(b)) => Some((a, b)),
        _ => None,
    }
}

fn lower(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Compares two strings ignoring case, character by character; a prefix sorts first.
fn caseless(a: impl Iterator<Item = char>, b: impl Iterator<Item = char>) -> Ordering {
    a.map(lower).cmp(b.map(lower))
}

/// Breaks a caseless tie at the first character that differs only in case.
fn case_tiebreak(a: &str, b: &str, lower_first: bool) -> Ordering {
    for (x, y) in a.chars().zip(b.chars()) {
        if x != y {
            let first_is_preferred = if lower_first {
                x.is_lowercase()
            } else {
                x.is_uppercase()
            };
            return if first_is_preferred {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
    }
    Ordering::Equal
}

/// Unicode codepoint order.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodepointComparer;

impl Comparer for CodepointComparer {
    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        texts(a, b).map_or(Ordering::Equal, |(a, b)| a.cmp(b))
    }
}

/// Caseless order, with case deciding only between otherwise equal strings.
#[derive(Debug, Clone, Copy)]
pub struct CaseOrderComparer {
    pub lower_first: bool,
}

impl Comparer for CaseOrderComparer {
    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        let Some((a, b)) = texts(a, b) else {
            return Ordering::Equal;
        };
        caseless(a.chars(), b.chars()).then_with(|| case_tiebreak(a, b, self.lower_first))
    }
}

/// Maps Latin-1 letters U+00C0 to U+00FF to their unaccented base letters.
const UNACCENTED: &str = "AAAAAAACEEEEIIII[NOOOOO*OUUUUY]Saaaaaaaceeeeiiii{nooooo*ouuuuy}y";

fn unaccent(c: char) -> char {
    match c as u32 {
        code @ 0xC0..=0xFF => UNACCENTED
            .chars()
            .nth((code - 0xC0) as usize)
            .unwrap_or(c),
        _ => c,
    }
}

/// English collation: accents are ignored first, then case is ignored, then case decides.
#[derive(Debug, Clone, Copy)]
pub struct EnglishComparer {
    pub lower_first: bool,
}

impl Default for EnglishComparer {
    fn default() -> Self {
        Self { lower_first: false }
    }
}

impl Comparer for EnglishComparer {
    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        let Some((a, b)) = texts(a, b) else {
            return Ordering::Equal;
        };
        caseless(a.chars().map(unaccent), b.chars().map(unaccent))
            .then_with(|| caseless(a.chars(), b.chars()))
            .then_with(|| case_tiebreak(a, b, self.lower_first))
    }
}

/// Numeric order with NaN after every number.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumericComparer;

impl Comparer for NumericComparer {
    fn prepare(&self, value: String) -> SortKey {
        SortKey::Number(string_to_number(&value))
    }

    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        match (a, b) {
            (SortKey::Number(x), SortKey::Number(y)) => match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
            },
            _ => Ordering::Equal,
        }
    }
}

/// Reverses another comparer.
#[derive(Debug)]
pub struct DescendingComparer(pub Box<dyn Comparer>);

impl Comparer for DescendingComparer {
    fn prepare(&self, value: String) -> SortKey {
        self.0.prepare(value)
    }

    fn compare(&self, a: &SortKey, b: &SortKey) -> Ordering {
        self.0.compare(a, b).reverse()
    }
}

/// One sort key: the key expression plus the attributes that pick its comparer. The
/// attributes are expressions evaluated once per sort against the outer context; the key is
/// evaluated once per node.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKeyDefinition<N> {
    pub key: Expression<N>,
    pub order: Option<Expression<N>>,
    pub data_type: Option<Expression<N>>,
    pub case_order: Option<Expression<N>>,
    pub lang: Option<Expression<N>>,
}

impl<N: TreeNode> SortKeyDefinition<N> {
    pub fn new(key: Expression<N>) -> Self {
        Self {
            key,
            order: None,
            data_type: None,
            case_order: None,
            lang: None,
        }
    }

    pub fn with_order(mut self, order: Expression<N>) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_data_type(mut self, data_type: Expression<N>) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn with_case_order(mut self, case_order: Expression<N>) -> Self {
        self.case_order = Some(case_order);
        self
    }

    pub fn with_lang(mut self, lang: Expression<N>) -> Self {
        self.lang = Some(lang);
        self
    }

    fn attributes(&self) -> impl Iterator<Item = &Expression<N>> {
        [&self.order, &self.data_type, &self.case_order, &self.lang]
            .into_iter()
            .flatten()
    }

    fn dependencies(&self) -> Dependencies {
        self.attributes()
            .fold(self.key.dependencies() & Dependencies::XSLT_CONTEXT, |deps, e| {
                deps | e.dependencies()
            })
    }

    fn map_attributes(
        &self,
        mut f: impl FnMut(&Expression<N>) -> Result<Expression<N>>,
        key: Expression<N>,
    ) -> Result<Self> {
        let mut apply = |e: &Option<Expression<N>>| e.as_ref().map(&mut f).transpose();
        Ok(Self {
            key,
            order: apply(&self.order)?,
            data_type: apply(&self.data_type)?,
            case_order: apply(&self.case_order)?,
            lang: apply(&self.lang)?,
        })
    }

    /// Builds the comparer this key uses in `context`.
    pub fn comparer(&self, context: &Context<'_, N>) -> Result<Box<dyn Comparer>> {
        let text = |e: &Option<Expression<N>>, default: &str| -> Result<String> {
            match e {
                Some(e) => e.evaluate_as_string(context),
                None => Ok(default.to_string()),
            }
        };
        let ascending = match text(&self.order, "ascending")?.as_str() {
            "ascending" => true,
            "descending" => false,
            _ => return Err(XPathError::evaluation("order must be ascending or descending")),
        };
        let lower_first = match text(&self.case_order, "#default")?.as_str() {
            "#default" => None,
            "lower-first" => Some(true),
            "upper-first" => Some(false),
            _ => {
                return Err(XPathError::evaluation(
                    "case-order must be lower-first or upper-first",
                ));
            }
        };
        let data_type = text(&self.data_type, "text")?;
        let comparer: Box<dyn Comparer> = match data_type.as_str() {
            "number" => Box::new(NumericComparer),
            "text" => self.text_comparer(lower_first, context)?,
            other if other.contains(':') => {
                log::warn!("no comparer for data-type {}, sorting as text", other);
                self.text_comparer(lower_first, context)?
            }
            _ => {
                return Err(XPathError::evaluation(
                    "data-type must be text, number, or a prefixed name",
                ));
            }
        };
        Ok(if ascending {
            comparer
        } else {
            Box::new(DescendingComparer(comparer))
        })
    }

    fn text_comparer(
        &self,
        lower_first: Option<bool>,
        context: &Context<'_, N>,
    ) -> Result<Box<dyn Comparer>> {
        if let Some(lang) = &self.lang {
            let lang = lang.evaluate_as_string(context)?;
            if !lang.to_ascii_lowercase().starts_with("en") {
                log::warn!("no collation for language {}, using English", lang);
            }
            return Ok(Box::new(EnglishComparer {
                lower_first: lower_first.unwrap_or(false),
            }));
        }
        Ok(match lower_first {
            None => Box::new(CodepointComparer),
            Some(lower_first) => Box::new(CaseOrderComparer { lower_first }),
        })
    }
}

/// A selection enumerated in sort-key order. Evaluated as a value it is an ordinary
/// node-set; only enumeration sees the sorted order.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedSelection<N> {
    pub selection: Box<Expression<N>>,
    pub keys: Vec<SortKeyDefinition<N>>,
}

impl<N: TreeNode> SortedSelection<N> {
    pub fn new(selection: Expression<N>, keys: Vec<SortKeyDefinition<N>>) -> Self {
        Self {
            selection: Box::new(selection),
            keys,
        }
    }

    pub fn dependencies(&self) -> Dependencies {
        self.keys
            .iter()
            .fold(self.selection.dependencies(), |deps, k| deps | k.dependencies())
    }

    pub fn simplify(self) -> Result<Expression<N>> {
        let selection = self.selection.simplify()?;
        if selection.is_empty_node_set() {
            return Ok(selection);
        }
        let keys = self
            .keys
            .into_iter()
            .map(|k| {
                let key = k.key.clone().simplify()?;
                k.map_attributes(|e| e.clone().simplify(), key)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Expression::Sorted(SortedSelection::new(selection, keys)))
    }

    pub fn reduce(&self, mask: Dependencies, context: &Context<'_, N>) -> Result<Expression<N>> {
        if !self.dependencies().intersects(mask) {
            return Ok(Expression::Sorted(self.clone()));
        }
        let selection = self.selection.reduce(mask, context)?;
        let keys = self
            .keys
            .iter()
            .map(|k| {
                let key = k.key.reduce(mask & Dependencies::XSLT_CONTEXT, context)?;
                k.map_attributes(|e| e.reduce(mask, context), key)
            })
            .collect::<Result<Vec<_>>>()?;
        Expression::Sorted(SortedSelection::new(selection, keys)).simplify()
    }

    /// Evaluates every key once per node, then sorts. Ties are broken by document order.
    pub fn enumerate<'e>(&'e self, context: &Context<'e, N>) -> Result<Enumeration<'e, N>> {
        let comparers = self
            .keys
            .iter()
            .map(|k| k.comparer(context))
            .collect::<Result<Vec<_>>>()?;
        let base = self.selection.enumerate(context)?;
        let nodes: Vec<N> = if base.is_document_sorted() {
            base.collect::<Result<_>>()?
        } else {
            NodeSetExtent::from_enumeration(base)?.sort().nodes().to_vec()
        };
        let last = nodes.len();
        let mut records = Vec::with_capacity(last);
        for (index, node) in nodes.into_iter().enumerate() {
            let item = context.for_item(node, index + 1, LastPosition::Known(last));
            let keys = self
                .keys
                .iter()
                .zip(&comparers)
                .map(|(k, c)| Ok(c.prepare(k.key.evaluate_as_string(&item)?)))
                .collect::<Result<Vec<_>>>()?;
            records.push((node, keys));
        }
        records.sort_by(|(a, ka), (b, kb)| {
            ka.iter()
                .zip(kb)
                .zip(&comparers)
                .map(|((x, y), c)| c.compare(x, y))
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.order_key().cmp(&b.order_key()))
        });
        let sorted: Vec<N> = records.into_iter().map(|(node, _)| node).collect();
        Ok(Box::new(ExtentEnumeration::new(sorted.into(), false, false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> SortKey {
        SortKey::Text(s.to_string())
    }

    #[test]
    fn test_codepoint_order() {
        let c = CodepointComparer;
        assert_eq!(c.compare(&text("B"), &text("a")), Ordering::Less);
        assert_eq!(c.compare(&text("ab"), &text("abc")), Ordering::Less);
    }

    #[test]
    fn test_case_order() {
        let lower = CaseOrderComparer { lower_first: true };
        let upper = CaseOrderComparer { lower_first: false };
        assert_eq!(lower.compare(&text("a"), &text("B")), Ordering::Less);
        assert_eq!(lower.compare(&text("a"), &text("A")), Ordering::Less);
        assert_eq!(upper.compare(&text("a"), &text("A")), Ordering::Greater);
        assert_eq!(upper.compare(&text("Ab"), &text("ab")), Ordering::Less);
    }

    #[test]
    fn test_english_ignores_accents_first() {
        let c = EnglishComparer::default();
        assert_eq!(c.compare(&text("\u{e9}cole"), &text("ecole")), Ordering::Greater);
        assert_eq!(c.compare(&text("\u{e9}a"), &text("eb")), Ordering::Less);
        assert_eq!(c.compare(&text("Zebra"), &text("apple")), Ordering::Greater);
    }

    #[test]
    fn test_numeric_nan_last() {
        let c = NumericComparer;
        let keys: Vec<SortKey> = ["10", "x", "9", "-1"]
            .iter()
            .map(|s| c.prepare(s.to_string()))
            .collect();
        let mut sorted = keys.clone();
        sorted.sort_by(|a, b| c.compare(a, b));
        assert_eq!(sorted[..3], [SortKey::Number(-1.0), SortKey::Number(9.0), SortKey::Number(10.0)]);
        assert!(matches!(sorted[3], SortKey::Number(n) if n.is_nan()));
        let desc = DescendingComparer(Box::new(NumericComparer));
        assert_eq!(desc.compare(&keys[0], &keys[2]), Ordering::Less);
    }
}
