//! XML fixtures shared by the integration tests.

pub const CATALOG: &str = r#"<?xml version="1.0"?>
<catalog xmlns:p="urn:pricing">
  <book id="b1" xml:lang="en">
    <title>Programming Rust</title>
    <author>Blandy</author>
    <price p:currency="USD">59.99</price>
    <year>2021</year>
  </book>
  <book id="b2" xml:lang="en-GB">
    <title>Rust in Action</title>
    <author>McNamara</author>
    <price p:currency="GBP">39.50</price>
    <year>2021</year>
  </book>
  <book id="b3" xml:lang="de">
    <title>Rust Atomics and Locks</title>
    <author>Bos</author>
    <price p:currency="USD">45</price>
    <year>2023</year>
  </book>
  <book id="b4" xml:lang="en">
    <title>The Rust Programming Language</title>
    <author>Klabnik</author>
    <price p:currency="USD">39.50</price>
    <year>2019</year>
  </book>
  <!-- end of catalog -->
</catalog>"#;

pub const REVIEWS: &str = r#"<reviews>
  <review book="b2" stars="5">Hands-on</review>
  <review book="b1" stars="4">Thorough</review>
  <review book="b2" stars="3">Long</review>
</reviews>"#;

pub const NAMES: &str = r#"<names>
  <name>émile</name>
  <name>Eve</name>
  <name>adam</name>
  <name>Adam</name>
  <name>eve</name>
</names>"#;
