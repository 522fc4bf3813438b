mod common;

use common::fixtures::{CATALOG, REVIEWS};
use common::{CatalogController, Node, TestResult, init_logger, leak_document};
use std::sync::Arc;
use treepath::{Context, Pattern, StaticEnv, TreeNode, XmlDocument, parse_pattern};

fn env() -> StaticEnv<Node> {
    StaticEnv::new().with_namespace("pr", "urn:pricing")
}

/// The `id` attributes of the books whose matching node the pattern accepts.
fn matching_books(doc: &'static XmlDocument<'static>, pattern: &Pattern<Node>, child: &str) -> Vec<String> {
    let context = Context::new(doc.root());
    let books: Vec<Node> = doc
        .find_element("catalog")
        .expect("catalog")
        .children()
        .filter(|n| n.name().is_some_and(|q| q.local_part == "book"))
        .collect();
    books
        .into_iter()
        .filter(|book| {
            let target = match child {
                "" => Some(*book),
                name => book
                    .children()
                    .find(|n| n.name().is_some_and(|q| q.local_part == name)),
            };
            target.is_some_and(|t| pattern.matches(t, &context).expect("pattern matches"))
        })
        .map(|book| book.attribute_value("", "id").unwrap_or_default())
        .collect()
}

#[test]
fn test_location_patterns() -> TestResult {
    init_logger();
    let doc = leak_document(CATALOG);
    let env = env();
    let cases = [
        ("book", "", vec!["b1", "b2", "b3", "b4"]),
        ("catalog/book[2]", "", vec!["b2"]),
        ("book[1]", "", vec!["b1"]),
        ("book[last()]", "", vec!["b4"]),
        ("book[year = 2021]/title", "title", vec!["b1", "b2"]),
        ("book[price > 50]/title", "title", vec!["b1"]),
        ("/catalog//year", "year", vec!["b1", "b2", "b3", "b4"]),
        ("id('b3')/author | id('b1')/author", "author", vec!["b1", "b3"]),
        ("price[@pr:currency = 'USD']", "price", vec!["b1", "b3", "b4"]),
        ("book[position() mod 2 = 0]", "", vec!["b2", "b4"]),
    ];
    for (source, child, expected) in cases {
        let pattern = parse_pattern(source, &env)?;
        assert_eq!(matching_books(doc, &pattern, child), expected, "{}", source);
    }
    Ok(())
}

#[test]
fn test_attribute_patterns() -> TestResult {
    let doc = leak_document(CATALOG);
    let context = Context::new(doc.root());
    let book = doc.root().element_by_id("b1").expect("b1");
    let id = book.attributes().find(|a| a.name().is_some_and(|q| q.local_part == "id")).expect("@id");
    assert!(parse_pattern("@id", &env())?.matches(id, &context)?);
    assert!(parse_pattern("book/@*", &env())?.matches(id, &context)?);
    assert!(!parse_pattern("book/node()", &env())?.matches(id, &context)?);
    assert!(!parse_pattern("@pr:*", &env())?.matches(id, &context)?);
    Ok(())
}

#[test]
fn test_key_pattern() -> TestResult {
    let reviews = leak_document(REVIEWS);
    let controller = CatalogController::default().with_key("by-book", "review", "book");
    let context = Context::new(reviews.root()).with_controller(Arc::new(controller));
    let pattern = parse_pattern("key('by-book', 'b2')", &env())?;
    let matched: Vec<String> = reviews
        .find_element("reviews")
        .expect("reviews")
        .children()
        .filter(|n| n.name().is_some())
        .filter(|n| pattern.matches(*n, &context).expect("key pattern"))
        .map(|n| n.string_value())
        .collect();
    assert_eq!(matched, vec!["Hands-on", "Long"]);
    Ok(())
}

#[test]
fn test_default_priorities() -> TestResult {
    let env = env();
    let priorities = [
        ("book", 0.0),
        ("pr:*", -0.25),
        ("*", -0.5),
        ("text()", -0.5),
        ("processing-instruction('render')", 0.0),
        ("book/title", 0.5),
        ("book[1]", 0.5),
        ("id('b1')", 0.5),
    ];
    for (source, expected) in priorities {
        assert_eq!(parse_pattern(source, &env)?.default_priority(), expected, "{}", source);
    }
    Ok(())
}
