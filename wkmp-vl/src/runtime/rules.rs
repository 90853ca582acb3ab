//! Declarative rule files
//!
//! A rule file is TOML with one `[[rule]]` table per placement:
//!
//! ```toml
//! name = "music"
//!
//! [[rule]]
//! mime = "audio/*"
//! chain = ["Audio", "Artists", "{meta:upnp:artist|Unknown}", "{meta:upnp:album|Unknown}"]
//! class = "object.container.album.musicAlbum"
//! title = "{meta:dc:title|{field:title}}"
//! ```
//!
//! Placeholders: `{meta:<key>}`, `{aux:<key>}`, `{field:<name>}`,
//! `{res:<attr>}` (first resource), `{year:<meta key>}`, `{month:<meta key>}`,
//! each with an optional `|default`. The default may itself be a template.
//! Metadata keys may also be given by symbol (`{meta:M_ARTIST}`), resource
//! attributes likewise (`{res:R_SIZE}`), and `class` accepts a class symbol
//! (`UPNP_CLASS_CONTAINER_MUSIC_ALBUM`). A segment that is exactly `{dirs}`
//! expands to the location's directories below the import path. A rule whose
//! chain has no value and no default is skipped for that object.
//!
//! Further rule keys:
//!
//! | key           | effect                                                    |
//! |---------------|-----------------------------------------------------------|
//! | `object_type` | only match this kind (`OBJECT_TYPE_ITEM`, ...)            |
//! | `place`       | `false` creates the chain without placing the object      |
//! | `[rule.meta]` | metadata templates applied to the placed copy             |
//! | `log`         | template logged each time the rule applies                |

use super::{relative_dirs, ClassificationRuntime, PlaceCallback, PlacementRequest};
use crate::error::RuntimeFault;
use crate::surface::Surface;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use wkmp_common::catalog::vocabulary::upnp_class;
use wkmp_common::catalog::{MetaField, ObjectKind, ResAttr};

/// Rule file load errors
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A rule is structurally valid TOML but unusable
    #[error("rule {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleSpec>,
}

#[derive(Debug, Deserialize)]
struct RuleSpec {
    mime: String,
    #[serde(default)]
    class_prefix: Option<String>,
    #[serde(default)]
    object_type: Option<String>,
    chain: Vec<String>,
    #[serde(default)]
    class: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    meta: BTreeMap<String, String>,
    #[serde(default = "default_place")]
    place: bool,
    #[serde(default)]
    log: Option<String>,
    /// Stop evaluating later rules once this one matched
    #[serde(default)]
    stop: bool,
}

fn default_place() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Placeholder {
        namespace: String,
        key: String,
        default: Option<Template>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Template(Vec<Piece>);

#[derive(Debug)]
enum Segment {
    Dirs,
    Text(Template),
}

#[derive(Debug)]
struct Rule {
    mime: String,
    class_prefix: Option<String>,
    object_type: Option<ObjectKind>,
    chain: Vec<Segment>,
    class: String,
    title: Option<Template>,
    /// Metadata key and template, applied to the copy
    meta: Vec<(String, Template)>,
    place: bool,
    log: Option<Template>,
    stop: bool,
}

/// Runtime that evaluates a compiled rule file
#[derive(Debug)]
pub struct RuleSetRuntime {
    name: String,
    rules: Vec<Rule>,
}

impl RuleSetRuntime {
    pub fn from_file(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let runtime = Self::parse(&text)?;
        info!(
            path = %path.display(),
            rules = runtime.rules.len(),
            "Loaded rule file"
        );
        Ok(runtime)
    }

    pub fn parse(text: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(text)?;

        let mut rules = Vec::with_capacity(file.rules.len());
        for (index, spec) in file.rules.into_iter().enumerate() {
            rules.push(compile_rule(index, spec)?);
        }

        Ok(Self {
            name: file.name.unwrap_or_else(|| "rules".to_string()),
            rules,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

fn compile_rule(index: usize, spec: RuleSpec) -> Result<Rule, RuleError> {
    let invalid = |reason: String| RuleError::Invalid { index, reason };

    if spec.mime.trim().is_empty() {
        return Err(invalid("mime pattern is empty".to_string()));
    }
    if spec.chain.is_empty() {
        return Err(invalid("chain is empty".to_string()));
    }

    let mut chain = Vec::with_capacity(spec.chain.len());
    for segment in &spec.chain {
        if segment == "{dirs}" {
            chain.push(Segment::Dirs);
        } else if segment.contains("{dirs}") {
            return Err(invalid(format!(
                "'{{dirs}}' must be a whole segment, found in '{}'",
                segment
            )));
        } else {
            chain.push(Segment::Text(parse_template(segment).map_err(&invalid)?));
        }
    }

    let title = match &spec.title {
        Some(t) => Some(parse_template(t).map_err(&invalid)?),
        None => None,
    };
    let log = match &spec.log {
        Some(t) => Some(parse_template(t).map_err(&invalid)?),
        None => None,
    };

    let mut meta = Vec::with_capacity(spec.meta.len());
    for (key, template) in &spec.meta {
        let field = MetaField::from_symbol(key)
            .or_else(|| MetaField::from_key(key))
            .ok_or_else(|| invalid(format!("unknown metadata key '{}'", key)))?;
        meta.push((
            field.key().to_string(),
            parse_template(template).map_err(&invalid)?,
        ));
    }

    let object_type = match &spec.object_type {
        Some(symbol) => Some(
            ObjectKind::from_symbol(symbol)
                .ok_or_else(|| invalid(format!("unknown object type '{}'", symbol)))?,
        ),
        None => None,
    };

    let class = match spec.class {
        Some(class) if class.starts_with("UPNP_CLASS_") => upnp_class::from_symbol(&class)
            .ok_or_else(|| invalid(format!("unknown class symbol '{}'", class)))?
            .to_string(),
        Some(class) => class,
        None => upnp_class::CONTAINER.to_string(),
    };

    Ok(Rule {
        mime: spec.mime.trim().to_string(),
        class_prefix: spec.class_prefix,
        object_type,
        chain,
        class,
        title,
        meta,
        place: spec.place,
        log,
        stop: spec.stop,
    })
}

fn parse_template(text: &str) -> Result<Template, String> {
    let (template, rest) = parse_pieces(text, false)?;
    if !rest.is_empty() {
        return Err(format!("unbalanced '}}' in '{}'", text));
    }
    Ok(template)
}

/// Parse until the end of input, or until an unmatched `}` when nested
fn parse_pieces(mut text: &str, nested: bool) -> Result<(Template, &str), String> {
    let mut pieces = Vec::new();
    let mut literal = String::new();

    while let Some(c) = text.chars().next() {
        match c {
            '{' => {
                if !literal.is_empty() {
                    pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                }
                let (piece, rest) = parse_placeholder(&text[1..])?;
                pieces.push(piece);
                text = rest;
            }
            '}' if nested => break,
            '}' => return Err("unexpected '}'".to_string()),
            '|' if nested => break,
            other => {
                literal.push(other);
                text = &text[other.len_utf8()..];
            }
        }
    }

    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok((Template(pieces), text))
}

/// Parse `ns:key|default}` (the opening brace already consumed)
fn parse_placeholder(text: &str) -> Result<(Piece, &str), String> {
    let end = text
        .find(['|', '}'])
        .ok_or_else(|| "unterminated placeholder".to_string())?;
    let head = &text[..end];
    let (namespace, key) = head
        .split_once(':')
        .ok_or_else(|| format!("placeholder '{{{}}}' has no namespace", head))?;

    let mut rest = &text[end..];
    let mut default = None;
    if let Some(after_bar) = rest.strip_prefix('|') {
        let (template, remaining) = parse_pieces(after_bar, true)?;
        default = Some(template);
        rest = remaining;
    }
    let rest = rest
        .strip_prefix('}')
        .ok_or_else(|| format!("unterminated placeholder '{{{}'", head))?;

    Ok((
        Piece::Placeholder {
            namespace: namespace.to_string(),
            key: resolve_symbol(namespace, key),
            default,
        },
        rest,
    ))
}

/// Wire key for a symbol in namespaces that publish them
fn resolve_symbol(namespace: &str, key: &str) -> String {
    let resolved: Option<&str> = match namespace {
        "meta" | "year" | "month" => MetaField::from_symbol(key).map(MetaField::key),
        "res" => ResAttr::from_symbol(key).map(ResAttr::key),
        _ => None,
    };
    resolved.unwrap_or(key).to_string()
}

impl Template {
    /// Render against a surface; `None` when a value is missing with no default
    fn render(&self, surface: &Surface) -> Result<Option<String>, String> {
        let mut out = String::new();
        for piece in &self.0 {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Placeholder {
                    namespace,
                    key,
                    default,
                } => {
                    let value = lookup(surface, namespace, key)?;
                    match (value, default) {
                        (Some(v), _) => out.push_str(&v),
                        (None, Some(d)) => match d.render(surface)? {
                            Some(v) => out.push_str(&v),
                            None => return Ok(None),
                        },
                        (None, None) => return Ok(None),
                    }
                }
            }
        }
        Ok(Some(out))
    }
}

fn lookup(surface: &Surface, namespace: &str, key: &str) -> Result<Option<String>, String> {
    let value = match namespace {
        "meta" => surface.meta(key).map(str::to_string),
        "aux" => surface.aux(key).map(str::to_string),
        "res" => surface.res.get(key).filter(|v| !v.is_empty()).cloned(),
        "field" => surface.text(key),
        "year" => surface
            .meta(key)
            .and_then(|d| d.split('-').next())
            .filter(|y| !y.is_empty())
            .map(str::to_string),
        "month" => surface
            .meta(key)
            .and_then(|d| d.split('-').nth(1))
            .filter(|m| !m.is_empty())
            .map(str::to_string),
        other => return Err(format!("unknown template namespace '{}'", other)),
    };
    Ok(value)
}

fn mime_matches(pattern: &str, mime: &str) -> bool {
    if pattern == "*" || pattern == "*/*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(major) => mime
            .split_once('/')
            .map(|(m, _)| m == major)
            .unwrap_or(false),
        None => pattern == mime,
    }
}

impl Rule {
    fn matches(&self, surface: &Surface) -> bool {
        if !mime_matches(&self.mime, &surface.mime_type()) {
            return false;
        }
        if let Some(kind) = self.object_type {
            if surface.int(crate::surface::keys::OBJECT_TYPE) != Some(kind.code()) {
                return false;
            }
        }
        match &self.class_prefix {
            Some(prefix) => surface
                .text(crate::surface::keys::CLASS)
                .map(|c| c.starts_with(prefix.as_str()))
                .unwrap_or(false),
            None => true,
        }
    }

    /// Build the chain for this object; `None` skips the rule
    fn render_chain(
        &self,
        surface: &Surface,
        import_path: &str,
    ) -> Result<Option<Vec<String>>, String> {
        let mut chain = Vec::with_capacity(self.chain.len());
        for segment in &self.chain {
            match segment {
                Segment::Dirs => chain.extend(relative_dirs(&surface.location(), import_path)),
                Segment::Text(template) => match template.render(surface)? {
                    Some(text) => chain.push(text),
                    None => return Ok(None),
                },
            }
        }
        Ok(Some(chain))
    }
}

#[async_trait]
impl ClassificationRuntime for RuleSetRuntime {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &mut self,
        surface: Surface,
        import_path: &str,
        place: &dyn PlaceCallback,
    ) -> Result<(), RuntimeFault> {
        for (index, rule) in self.rules.iter().enumerate() {
            if !rule.matches(&surface) {
                continue;
            }

            let fault = |message: String| {
                RuntimeFault::rule(&self.name, format!("rule {}: {}", index, message))
            };

            let Some(chain) = rule.render_chain(&surface, import_path).map_err(fault)? else {
                debug!(rule = index, "Template value missing, rule skipped");
                continue;
            };

            if let Some(log) = &rule.log {
                if let Some(message) = log.render(&surface).map_err(fault)? {
                    info!(runtime = %self.name, rule = index, "{}", message);
                }
            }

            if !rule.place {
                place.add_container_tree(&chain, &rule.class).await;
            } else {
                // Edits go to a copy; later rules still see the original
                let mut fields = surface.clone();
                if let Some(title) = &rule.title {
                    if let Some(title) = title.render(&surface).map_err(fault)? {
                        fields.set_title(title);
                    }
                }
                for (key, template) in &rule.meta {
                    if let Some(value) = template.render(&surface).map_err(fault)? {
                        fields.set_meta(key, value);
                    }
                }

                place
                    .place(PlacementRequest::new(fields, chain, rule.class.as_str()))
                    .await;
            }

            if rule.stop {
                break;
            }
        }
        Ok(())
    }
}
