mod common;

use common::fixtures::{CATALOG, REVIEWS};
use common::{CatalogController, Node, TestResult, init_logger, leak_document};
use std::sync::Arc;
use treepath::xpath::functions::format_number::DecimalFormat;
use treepath::xpath::{ExtensionRegistry, XPathError};
use treepath::{Context, StaticEnv, TreeNode, Value, parse};

fn controller() -> CatalogController {
    CatalogController::default()
        .with_key("by-book", "review", "book")
        .with_document("reviews.xml", REVIEWS)
        .with_format(
            "euro",
            DecimalFormat {
                decimal_separator: ',',
                grouping_separator: '.',
                ..DecimalFormat::default()
            },
        )
        .with_property("urn:ex", "colour", "blue")
}

fn env() -> StaticEnv<Node> {
    StaticEnv::new()
        .with_namespace("ex", "urn:ex")
        .with_namespace("xsl", "http://www.w3.org/1999/XSL/Transform")
}

#[test]
fn test_key_lookup() -> TestResult {
    init_logger();
    let reviews = leak_document(REVIEWS);
    let context = Context::new(reviews.root()).with_controller(Arc::new(controller()));
    let env = env();
    assert_eq!(parse("count(key('by-book', 'b2'))", &env)?.evaluate_as_number(&context)?, 2.0);
    assert_eq!(parse("sum(key('by-book', 'b2')/@stars)", &env)?.evaluate_as_number(&context)?, 8.0);
    assert_eq!(
        parse("string(key('by-book', //review[@stars = 4]/@book))", &env)?
            .evaluate_as_string(&context)?,
        "Thorough"
    );
    Ok(())
}

#[test]
fn test_key_requires_controller() -> TestResult {
    let reviews = leak_document(REVIEWS);
    let err = parse("key('by-book', 'b2')", &env())?
        .evaluate(&Context::new(reviews.root()))
        .unwrap_err();
    assert!(matches!(err, XPathError::Evaluation(_)));
    Ok(())
}

#[test]
fn test_document_loading() -> TestResult {
    let catalog = leak_document(CATALOG);
    let context = Context::new(catalog.root()).with_controller(Arc::new(controller()));
    let env = env();
    let count = parse("count(document('reviews.xml')//review[@book = 'b2'])", &env)?;
    assert_eq!(count.evaluate_as_number(&context)?, 2.0);
    let missing = parse("document('absent.xml')", &env)?;
    assert!(missing.evaluate(&context).is_err());
    Ok(())
}

#[test]
fn test_cross_document_join_with_current() -> TestResult {
    let catalog = leak_document(CATALOG);
    let book = catalog.root().element_by_id("b2").expect("book b2");
    let context = Context::new(book)
        .with_current_node(book)
        .with_controller(Arc::new(controller()));
    let stars = parse("sum(document('reviews.xml')//review[@book = current()/@id]/@stars)", &env())?;
    assert_eq!(stars.evaluate_as_number(&context)?, 8.0);
    Ok(())
}

#[test]
fn test_format_number() -> TestResult {
    let catalog = leak_document(CATALOG);
    let context = Context::new(catalog.root()).with_controller(Arc::new(controller()));
    let env = env();
    let cases = [
        ("format-number(1234.5, '#,##0.00')", "1,234.50"),
        ("format-number(1234.5, '#.##0,00', 'euro')", "1.234,50"),
        ("format-number(0.256, '0.0%')", "25.6%"),
        ("format-number(-3, '0;(0)')", "(3)"),
        ("format-number(sum(//price), '#0.0')", "184.0"),
    ];
    for (source, expected) in cases {
        assert_eq!(parse(source, &env)?.evaluate_as_string(&context)?, expected, "{}", source);
    }
    let unknown = parse("format-number(1, '0', 'dollar')", &env)?;
    assert!(unknown.evaluate(&context).is_err());
    Ok(())
}

#[test]
fn test_system_properties() -> TestResult {
    let catalog = leak_document(CATALOG);
    let context = Context::new(catalog.root()).with_controller(Arc::new(controller()));
    let env = env();
    assert_eq!(parse("system-property('xsl:version')", &env)?.evaluate_as_number(&context)?, 1.0);
    assert_eq!(parse("system-property('xsl:vendor')", &env)?.evaluate_as_string(&context)?, "treepath");
    assert_eq!(parse("system-property('ex:colour')", &env)?.evaluate_as_string(&context)?, "blue");
    assert_eq!(parse("system-property('ex:size')", &env)?.evaluate_as_string(&context)?, "");
    Ok(())
}

#[test]
fn test_extension_functions() -> TestResult {
    let catalog = leak_document(CATALOG);
    let mut registry: ExtensionRegistry<Node> = ExtensionRegistry::new();
    registry.register_fn("urn:ex", "shout", 1..=1, |args, _context| {
        Ok(Value::String(args[0].as_string()?.to_uppercase()))
    });
    let env = env().with_extensions(registry);
    let context = Context::new(catalog.root());
    let shout = parse("ex:shout(//book[3]/author)", &env)?;
    assert_eq!(shout.evaluate_as_string(&context)?, "BOS");
    assert!(parse("function-available('ex:shout')", &env)?.evaluate_as_boolean(&context)?);
    assert!(parse("function-available('concat')", &env)?.evaluate_as_boolean(&context)?);
    assert!(!parse("function-available('ex:whisper')", &env)?.evaluate_as_boolean(&context)?);
    assert!(matches!(
        parse("ex:shout(1, 2)", &env).unwrap_err(),
        XPathError::UnknownFunction(_)
    ));
    Ok(())
}
