/*
  Fetching external RDF into a local graph for LOAD. Only local files
  are read, through the rio parsers.
*/

use {
  std::{fs::File, io::BufReader, path::Path},
  rio_api::{
    model::{Literal, NamedNode, Subject, Term, Triple as RioTriple},
    parser::TriplesParser,
  },
  rio_turtle::{NTriplesParser, TurtleParser},
  rio_xml::RdfXmlParser,
  tracing::debug,
  crate::{
    errors::{Error, Result},
    rdf::graph::{Graph, Triple},
    RdfNode,
  },
};

/// Fills a graph from an external source. Injected into the update
/// processor for LOAD commands.
pub trait RdfLoader: Send + Sync {
  fn load(&self, source_uri: &str, graph: &mut Graph) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdfFormat {
  Turtle,
  NTriples,
  RdfXml,
}

impl RdfFormat {
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref() {
      Some("nt") => RdfFormat::NTriples,
      Some("rdf") | Some("xml") | Some("owl") => RdfFormat::RdfXml,
      _ => RdfFormat::Turtle,
    }
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl FileLoader {
  fn local_path(source_uri: &str) -> Result<&Path> {
    if let Some(path) = source_uri.strip_prefix("file://") {
      return Ok(Path::new(path))
    }
    if let Some(path) = source_uri.strip_prefix("file:") {
      return Ok(Path::new(path))
    }
    if source_uri.contains("://") {
      return Err(Error::Unsupported(format!("cannot load {}, only local files are supported", source_uri)))
    }
    Ok(Path::new(source_uri))
  }
}

impl RdfLoader for FileLoader {
  fn load(&self, source_uri: &str, graph: &mut Graph) -> Result<()> {
    let path = Self::local_path(source_uri)?;
    let format = RdfFormat::from_path(path);
    debug!(?path, ?format, "loading rdf file");
    let reader = BufReader::new(File::open(path)?);
    match format {
      RdfFormat::Turtle => TurtleParser::new(reader, None).parse_all(&mut |t| {
        graph.assert(convert_triple(&t)?);
        Ok(()) as Result<()>
      }),
      RdfFormat::NTriples => NTriplesParser::new(reader).parse_all(&mut |t| {
        graph.assert(convert_triple(&t)?);
        Ok(()) as Result<()>
      }),
      RdfFormat::RdfXml => RdfXmlParser::new(reader, None).parse_all(&mut |t| {
        graph.assert(convert_triple(&t)?);
        Ok(()) as Result<()>
      }),
    }
  }
}

fn convert_triple(t: &RioTriple) -> Result<Triple> {
  let subject = match t.subject {
    Subject::NamedNode(NamedNode{ iri }) => RdfNode::named(iri),
    Subject::BlankNode(b) => RdfNode::blank(b.id),
    _ => return Err(Error::Unsupported("quoted triples are not supported".into())),
  };
  let NamedNode{ iri } = t.predicate;
  let object = match t.object {
    Term::NamedNode(NamedNode{ iri }) => RdfNode::named(iri),
    Term::BlankNode(b) => RdfNode::blank(b.id),
    Term::Literal(Literal::Simple{ value }) => RdfNode::literal(value),
    Term::Literal(Literal::LanguageTaggedString{ value, language }) => RdfNode::lang_literal(value, language),
    Term::Literal(Literal::Typed{ value, datatype: NamedNode{ iri: dt } }) => RdfNode::typed_literal(value, dt),
    _ => return Err(Error::Unsupported("quoted triples are not supported".into())),
  };
  Ok(Triple::new(subject, RdfNode::named(iri), object))
}

#[cfg(test)]
mod unit_tests {
  use super::*;

  fn scratch_file(name: &str, body: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("ripple_virt_{}_{}", std::process::id(), name));
    std::fs::write(&path, body).unwrap();
    path
  }

  #[test]
  fn loads_turtle() {
    let path = scratch_file("people.ttl", r#"
      @prefix ex: <http://example.org/> .
      ex:gabe ex:likes ex:rust ;
        ex:name "Gabe"@en ;
        ex:age "27"^^<http://www.w3.org/2001/XMLSchema#integer> .
      _:anon ex:knows ex:gabe .
    "#);
    let mut graph = Graph::new(Some("http://g"));
    FileLoader.load(&format!("file://{}", path.display()), &mut graph).unwrap();
    assert_eq!(graph.len(), 4);
    assert!(graph.contains(&Triple::new(
      RdfNode::named("http://example.org/gabe"),
      RdfNode::named("http://example.org/name"),
      RdfNode::lang_literal("Gabe", "en"),
    )));
    assert!(graph.iter().any(|t| t.subject.is_blank()));
  }

  #[test]
  fn loads_ntriples_by_extension() {
    let path = scratch_file("one.nt", "<http://a> <http://b> \"c\" .\n");
    let mut graph = Graph::new(None);
    FileLoader.load(path.to_str().unwrap(), &mut graph).unwrap();
    assert_eq!(graph.len(), 1);
  }

  #[test]
  fn remote_sources_are_unsupported() {
    let mut graph = Graph::new(None);
    let err = FileLoader.load("http://example.org/data.ttl", &mut graph).unwrap_err();
    assert_eq!(err.code(), "UNSUPPORTED");
  }

  #[test]
  fn syntax_errors_surface_as_parser_errors() {
    let path = scratch_file("broken.ttl", "<http://a> <http://b> .");
    let mut graph = Graph::new(None);
    let err = FileLoader.load(path.to_str().unwrap(), &mut graph).unwrap_err();
    assert_eq!(err.code(), "PARSER");
  }
}
