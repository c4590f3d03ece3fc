//! Spec syntax.
//!
//! ```text
//! spec     := node ( '^' edge? node )*
//! node     := name? modifier*
//! modifier := '@' versions | '%' name ('@' versions)? | '+' name | '~' name
//!           | key '=' value
//! edge     := '[' ( 'virtuals=' names | 'deptypes=' types )* ']'
//! ```
//!
//! `arch`, `platform`, `os` and `target` keys set the architecture, the
//! six flag categories (`cflags=...`) set compiler flags, and every other
//! key is a variant. Values may be quoted.

use std::collections::BTreeSet;

use hpkg_version::VersionList;

use crate::arch::ArchSpec;
use crate::compiler::CompilerSpec;
use crate::deptypes::DepTypes;
use crate::error::{Result, SpecError};
use crate::flags::is_flag_name;
use crate::graph::Spec;
use crate::node::SpecNode;
use crate::variant::VariantValue;

/// Parse a single node with no dependencies.
pub fn parse_node(input: &str) -> Result<SpecNode> {
    let mut scanner = Scanner::new(input);
    let node = scanner.node()?;
    scanner.skip_ws();
    if !scanner.at_end() {
        return Err(scanner.error("dependencies are not allowed here"));
    }
    Ok(node)
}

/// Parse a spec. Dependencies attach to the root.
pub fn parse_spec(input: &str) -> Result<Spec> {
    let mut scanner = Scanner::new(input);
    let mut spec = Spec::new(scanner.node()?);
    let root = spec.root();
    loop {
        scanner.skip_ws();
        if scanner.at_end() {
            break;
        }
        scanner.expect('^')?;
        scanner.skip_ws();
        let (types, virtuals) = if scanner.peek() == Some('[') {
            scanner.edge_attributes()?
        } else {
            (DepTypes::DEFAULT, BTreeSet::new())
        };
        let node = scanner.node()?;
        if node.is_anonymous() {
            return Err(scanner.error("a dependency needs a package name"));
        }
        let child = spec.add_node(node);
        spec.add_dependency(root, child, types, virtuals)?;
    }
    // Merged duplicates leave unreachable nodes behind.
    Ok(spec.subgraph(root))
}

impl std::str::FromStr for Spec {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self> {
        parse_spec(s)
    }
}

impl Spec {
    pub fn parse(input: &str) -> Result<Self> {
        parse_spec(input)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || matches!(c, '.' | '-')
}

struct Scanner<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Scanner {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, detail: impl Into<String>) -> SpecError {
        SpecError::parse(self.input, format!("{} at column {}", detail.into(), self.pos + 1))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        match self.peek() {
            Some(found) if found == c => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(self.error(format!("expected '{c}', found '{found}'"))),
            None => Err(self.error(format!("expected '{c}'"))),
        }
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn name(&mut self) -> Result<String> {
        match self.peek() {
            Some(c) if is_name_start(c) => Ok(self.take_while(is_name_char)),
            _ => Err(self.error("expected a name")),
        }
    }

    fn versions(&mut self) -> Result<VersionList> {
        let text = self.take_while(|c| !c.is_whitespace() && !matches!(c, '%' | '+' | '~' | '^'));
        if text.is_empty() {
            return Err(self.error("expected versions after '@'"));
        }
        Ok(VersionList::parse(&text)?)
    }

    fn value(&mut self) -> Result<String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let text = self.take_while(|c| c != quote);
                self.expect(quote)?;
                Ok(text)
            }
            _ => {
                let text = self.take_while(|c| !c.is_whitespace() && c != '^');
                if text.is_empty() {
                    return Err(self.error("expected a value after '='"));
                }
                Ok(text)
            }
        }
    }

    fn node(&mut self) -> Result<SpecNode> {
        let mut node = SpecNode::anonymous();
        loop {
            self.skip_ws();
            let Some(c) = self.peek() else {
                break;
            };
            match c {
                '^' => break,
                '@' => {
                    self.pos += 1;
                    let versions = self.versions()?;
                    let narrowed = node.versions.intersection(&versions);
                    if narrowed.is_empty() {
                        return Err(self.error(format!("versions '{versions}' conflict with '{}'", node.versions)));
                    }
                    node.versions = narrowed;
                }
                '%' => {
                    self.pos += 1;
                    self.skip_ws();
                    let name = self.name()?;
                    let versions = if self.peek() == Some('@') {
                        self.pos += 1;
                        self.versions()?
                    } else {
                        VersionList::any()
                    };
                    let compiler = CompilerSpec::new(&name, versions);
                    match &mut node.compiler {
                        Some(existing) => {
                            existing.constrain(&compiler)?;
                        }
                        None => node.compiler = Some(compiler),
                    }
                }
                '+' | '~' => {
                    self.pos += 1;
                    let name = self.name()?;
                    set_variant(&mut node, &name, VariantValue::Bool(c == '+'))?;
                }
                c if is_name_start(c) => {
                    let word = self.name()?;
                    if self.peek() == Some('=') {
                        self.pos += 1;
                        let value = self.value()?;
                        self.assign(&mut node, &word, &value)?;
                    } else if node.is_anonymous() && node == SpecNode::anonymous() {
                        node.name = word;
                    } else {
                        return Err(self.error(format!("unexpected name '{word}'")));
                    }
                }
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            }
        }
        Ok(node)
    }

    fn assign(&self, node: &mut SpecNode, key: &str, value: &str) -> Result<()> {
        let arch = match key {
            "arch" => Some(ArchSpec::parse(value)?),
            "platform" => Some(ArchSpec {
                platform: Some(value.to_string()),
                ..Default::default()
            }),
            "os" => Some(ArchSpec {
                os: Some(value.to_string()),
                ..Default::default()
            }),
            "target" => Some(ArchSpec {
                target: Some(value.to_string()),
                ..Default::default()
            }),
            _ => None,
        };
        if let Some(arch) = arch {
            node.arch.constrain(&arch)?;
        } else if is_flag_name(key) {
            node.flags.add(key, value)?;
        } else {
            set_variant(node, key, VariantValue::parse(value))?;
        }
        Ok(())
    }

    fn edge_attributes(&mut self) -> Result<(DepTypes, BTreeSet<String>)> {
        self.expect('[')?;
        let mut types = DepTypes::DEFAULT;
        let mut virtuals = BTreeSet::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                break;
            }
            let key = self.name()?;
            self.expect('=')?;
            let value = self.take_while(|c| !c.is_whitespace() && c != ']');
            match key.as_str() {
                "virtuals" => virtuals.extend(value.split(',').filter(|v| !v.is_empty()).map(str::to_string)),
                "deptypes" => types = DepTypes::parse(&value)?,
                _ => return Err(self.error(format!("unknown edge attribute '{key}'"))),
            }
        }
        Ok((types, virtuals))
    }
}

fn set_variant(node: &mut SpecNode, name: &str, value: VariantValue) -> Result<()> {
    match node.variants.get_mut(name) {
        Some(existing) => {
            existing.constrain(name, &value)?;
        }
        None => {
            node.variants.insert(name.to_string(), value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstraintKind;

    #[test]
    fn full_node() {
        let node = parse_node("hdf5@1.10:1.12 %gcc@12: +mpi ~fortran api=v110 cflags=\"-O2 -g\" target=x86_64")
            .unwrap();
        assert_eq!(node.name, "hdf5");
        assert_eq!(node.versions.to_string(), "1.10:1.12");
        let compiler = node.compiler.as_ref().unwrap();
        assert_eq!(compiler.name, "gcc");
        assert_eq!(compiler.versions.to_string(), "12:");
        assert_eq!(node.variant("mpi"), Some(&VariantValue::Bool(true)));
        assert_eq!(node.variant("fortran"), Some(&VariantValue::Bool(false)));
        assert_eq!(node.variant("api"), Some(&VariantValue::Single("v110".into())));
        assert_eq!(node.flags.get("cflags"), ["-O2".to_string(), "-g".to_string()]);
        assert_eq!(node.arch.target.as_deref(), Some("x86_64"));
    }

    #[test]
    fn anonymous_guards() {
        let node = parse_node("+shared").unwrap();
        assert!(node.is_anonymous());
        let node = parse_node("@:1.4 build_type=Debug").unwrap();
        assert!(node.is_anonymous());
        assert_eq!(node.versions.to_string(), ":1.4");
    }

    #[test]
    fn repeated_versions_intersect() {
        let node = parse_node("zlib@1.2: @:1.3").unwrap();
        assert_eq!(node.versions.to_string(), "1.2:1.3");
        assert!(parse_node("zlib@1.0 @2.0").is_err());
    }

    #[test]
    fn git_refs_and_commits_are_versions() {
        let node = parse_node("tool@git.main").unwrap();
        assert_eq!(node.versions.to_string(), "git.main");
        assert!(node.versions.unresolved().next().is_some());

        let sha = "0123456789abcdef0123456789abcdef01234567";
        let node = parse_node(&format!("tool@{sha}")).unwrap();
        assert_eq!(node.versions.to_string(), sha);

        let spec = parse_spec("app ^tool@git.v1.2=1.2").unwrap();
        let tool = spec.node(spec.find("tool").unwrap());
        assert!(tool.versions.unresolved().next().is_none());
        assert!(parse_node("tool@git.main @git.other").is_err());
    }

    #[test]
    fn contradictory_variants_rejected() {
        let err = parse_node("zlib+shared~shared").unwrap_err();
        assert!(matches!(
            err,
            SpecError::Unsatisfiable {
                kind: ConstraintKind::Variant,
                ..
            }
        ));
    }

    #[test]
    fn dependencies_with_edge_attributes() {
        let spec = parse_spec("app ^[virtuals=mpi deptypes=build,link,run] openmpi@4: ^zlib").unwrap();
        assert_eq!(spec.node_count(), 3);
        let edge = spec.edge(spec.root(), "openmpi").unwrap();
        assert!(edge.virtuals.contains("mpi"));
        assert_eq!(edge.types.to_string(), "build,link,run");
        assert_eq!(spec.edge(spec.root(), "zlib").unwrap().types, DepTypes::DEFAULT);
    }

    #[test]
    fn repeated_dependency_merges() {
        let spec = parse_spec("app ^zlib@1.2: ^zlib+shared").unwrap();
        assert_eq!(spec.node_count(), 2);
        let zlib = spec.node(spec.find("zlib").unwrap());
        assert_eq!(zlib.versions.to_string(), "1.2:");
        assert_eq!(zlib.variant("shared"), Some(&VariantValue::Bool(true)));
    }

    #[test]
    fn errors() {
        assert!(parse_spec("app ^+shared").is_err());
        assert!(parse_spec("app ^[color=red] zlib").is_err());
        assert!(parse_node("app zlib").is_err());
        assert!(parse_node("app ^zlib").is_err());
        assert!(parse_node("app cflags=").is_err());
        assert!(parse_node("app $").is_err());
        assert!(parse_node("app @").is_err());
    }

    #[test]
    fn display_round_trips() {
        for text in [
            "app@1.2:1.4%gcc@12:+mpi~shared build_type=Release",
            "app ^[virtuals=mpi] openmpi@4.1",
            "app cflags=\"-O2 -g\" arch=linux-rhel8-x86_64",
        ] {
            let spec = parse_spec(text).unwrap();
            assert_eq!(parse_spec(&spec.to_string()).unwrap(), spec, "{text}");
        }
    }
}
