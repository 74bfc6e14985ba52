//! A hand-written recursive-descent parser for mapped-statement SQL
//! bodies. Supports plain text, `#{}` bound parameters, `${}` raw text
//! substitution, `<if>`, `<choose>/<when>/<otherwise>`, `<where>`,
//! `<set>`, `<trim>`, `<foreach>`, `<bind>` and `<include>`.
//!
//! Parsing never fails: an unrecognized or malformed tag degrades to
//! plain text, and any tag left open at the end of the template is
//! auto-closed, mirroring how a browser HTML parser tolerates broken
//! markup.

use crate::sql::ast::Node;
use crate::sql::expr::{self, Expr};
use std::collections::HashMap;

enum TagFrame {
    If {
        test: Expr,
    },
    Choose {
        whens: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    When {
        test: Expr,
    },
    Otherwise,
    Where,
    Set,
    Trim {
        prefix: Option<String>,
        suffix: Option<String>,
        prefix_overrides: Vec<String>,
        suffix_overrides: Vec<String>,
    },
    Foreach {
        item: String,
        index: Option<String>,
        collection: String,
        open: String,
        separator: String,
        close: String,
    },
}

impl TagFrame {
    fn closing_tag(&self) -> &'static str {
        match self {
            TagFrame::If { .. } => "if",
            TagFrame::Choose { .. } => "choose",
            TagFrame::When { .. } => "when",
            TagFrame::Otherwise => "otherwise",
            TagFrame::Where => "where",
            TagFrame::Set => "set",
            TagFrame::Trim { .. } => "trim",
            TagFrame::Foreach { .. } => "foreach",
        }
    }
}

struct Parser<'a> {
    template: &'a str,
    pos: usize,
    nodes_stack: Vec<Vec<Node>>,
    tag_stack: Vec<TagFrame>,
}

impl<'a> Parser<'a> {
    fn new(template: &'a str) -> Self {
        Self {
            template,
            pos: 0,
            nodes_stack: vec![Vec::new()],
            tag_stack: Vec::new(),
        }
    }

    fn parse(mut self) -> Vec<Node> {
        while self.pos < self.template.len() {
            if self.try_parse_tag() || self.try_parse_bound() {
                continue;
            }
            self.parse_text();
        }
        self.close_remaining_tags();
        self.nodes_stack.pop().unwrap_or_default()
    }

    fn try_parse_tag(&mut self) -> bool {
        let remaining = &self.template[self.pos..];

        if remaining.starts_with("</") {
            return self.handle_close_tag(remaining);
        }

        let Some((name, attrs_src, self_closing, consumed)) = parse_open_tag(remaining) else {
            return false;
        };
        let attrs = parse_attributes(&attrs_src);

        match name.as_str() {
            "if" => self.open_block(attrs, consumed, |a| {
                a.get("test").map(|t| TagFrame::If { test: expr::parse(t) })
            }),
            "choose" => {
                self.nodes_stack.push(Vec::new());
                self.tag_stack.push(TagFrame::Choose {
                    whens: Vec::new(),
                    otherwise: Vec::new(),
                });
                self.pos += consumed;
                true
            }
            "when" => self.open_block(attrs, consumed, |a| {
                a.get("test").map(|t| TagFrame::When { test: expr::parse(t) })
            }),
            "otherwise" => {
                self.nodes_stack.push(Vec::new());
                self.tag_stack.push(TagFrame::Otherwise);
                self.pos += consumed;
                true
            }
            "where" => self.open_self_closable(TagFrame::Where, self_closing, consumed),
            "set" => self.open_self_closable(TagFrame::Set, self_closing, consumed),
            "trim" => {
                let prefix = attrs.get("prefix").cloned();
                let suffix = attrs.get("suffix").cloned();
                let prefix_overrides = split_overrides(attrs.get("prefixOverrides"));
                let suffix_overrides = split_overrides(attrs.get("suffixOverrides"));
                self.nodes_stack.push(Vec::new());
                self.tag_stack.push(TagFrame::Trim {
                    prefix,
                    suffix,
                    prefix_overrides,
                    suffix_overrides,
                });
                self.pos += consumed;
                true
            }
            "foreach" => {
                let (Some(item), Some(collection)) =
                    (attrs.get("item"), attrs.get("collection"))
                else {
                    return false;
                };
                self.nodes_stack.push(Vec::new());
                self.tag_stack.push(TagFrame::Foreach {
                    item: item.clone(),
                    index: attrs.get("index").cloned(),
                    collection: collection.clone(),
                    open: attrs.get("open").cloned().unwrap_or_default(),
                    separator: attrs.get("separator").cloned().unwrap_or_else(|| ",".to_string()),
                    close: attrs.get("close").cloned().unwrap_or_default(),
                });
                self.pos += consumed;
                true
            }
            "bind" => {
                let (Some(name), Some(value)) = (attrs.get("name"), attrs.get("value")) else {
                    return false;
                };
                self.append_node(Node::Bind {
                    name: name.clone(),
                    expr: expr::parse(value),
                });
                self.pos += consumed;
                true
            }
            "include" => {
                let Some(refid) = attrs.get("refid") else {
                    return false;
                };
                self.append_node(Node::Include { refid: refid.clone() });
                self.pos += consumed;
                true
            }
            _ => false,
        }
    }

    /// Opens a tag that always has a body (`<if>`, `<when>`), building its
    /// frame from the parsed attributes. Returns `false` (no input
    /// consumed) if the required attribute is missing, so the caller
    /// falls back to treating the tag as plain text.
    fn open_block(
        &mut self,
        attrs: HashMap<String, String>,
        consumed: usize,
        build: impl FnOnce(&HashMap<String, String>) -> Option<TagFrame>,
    ) -> bool {
        let Some(frame) = build(&attrs) else {
            return false;
        };
        self.nodes_stack.push(Vec::new());
        self.tag_stack.push(frame);
        self.pos += consumed;
        true
    }

    /// `<where>`/`<set>` may appear self-closed (`<where/>`) or as a
    /// block. A self-closed tag produces an empty-bodied node directly.
    fn open_self_closable(&mut self, frame: TagFrame, self_closing: bool, consumed: usize) -> bool {
        if self_closing {
            self.append_node(match frame {
                TagFrame::Where => Node::Where(Vec::new()),
                TagFrame::Set => Node::Set(Vec::new()),
                _ => unreachable!(),
            });
        } else {
            self.nodes_stack.push(Vec::new());
            self.tag_stack.push(frame);
        }
        self.pos += consumed;
        true
    }

    fn handle_close_tag(&mut self, remaining: &str) -> bool {
        let Some(tag_name) = remaining[2..].split(['>', ' ']).next() else {
            return false;
        };
        let Some(frame) = self.tag_stack.last() else {
            return false;
        };
        if frame.closing_tag() != tag_name {
            return false;
        }
        let close_len = 2 + tag_name.len() + 1; // "</" + name + ">"
        let frame = self.tag_stack.pop().unwrap();
        let mut body = self.nodes_stack.pop().unwrap_or_default();
        self.trim_text_nodes(&mut body);
        self.close_frame(frame, body);
        self.pos += close_len;
        true
    }

    fn close_frame(&mut self, frame: TagFrame, body: Vec<Node>) {
        match frame {
            TagFrame::If { test } => self.append_node(Node::If { test, body }),
            TagFrame::Where => self.append_node(Node::Where(body)),
            TagFrame::Set => self.append_node(Node::Set(body)),
            TagFrame::Trim {
                prefix,
                suffix,
                prefix_overrides,
                suffix_overrides,
            } => self.append_node(Node::Trim {
                prefix,
                suffix,
                prefix_overrides,
                suffix_overrides,
                body,
            }),
            TagFrame::Foreach {
                item,
                index,
                collection,
                open,
                separator,
                close,
            } => self.append_node(Node::Foreach {
                item,
                index,
                collection,
                open,
                separator,
                close,
                body,
            }),
            TagFrame::When { test } => {
                if let Some(TagFrame::Choose { whens, .. }) = self.tag_stack.last_mut() {
                    whens.push((test, body));
                }
            }
            TagFrame::Otherwise => {
                if let Some(TagFrame::Choose { otherwise, .. }) = self.tag_stack.last_mut() {
                    *otherwise = body;
                }
            }
            TagFrame::Choose { whens, otherwise } => {
                self.append_node(Node::Choose { whens, otherwise });
            }
        }
    }

    fn trim_text_nodes(&self, nodes: &mut Vec<Node>) {
        if let Some(Node::Text(text)) = nodes.first_mut() {
            let trimmed = text.trim_start();
            let ws_len = text.len() - trimmed.len();
            if text[..ws_len].contains('\n') {
                if trimmed.is_empty() {
                    nodes.remove(0);
                } else {
                    *text = trimmed.to_string();
                }
            }
        }
        if let Some(Node::Text(text)) = nodes.last_mut() {
            let trimmed = text.trim_end();
            if text[trimmed.len()..].contains('\n') {
                if trimmed.is_empty() {
                    nodes.pop();
                } else {
                    *text = trimmed.to_string();
                }
            }
        }
    }

    /// `#{expr[,jdbcType=TYPE]}` or `${expr}`.
    fn try_parse_bound(&mut self) -> bool {
        let remaining = &self.template[self.pos..];
        if remaining.starts_with("#{")
            && let Some(end) = remaining.find('}')
        {
            let inner = remaining[2..end].trim();
            if inner.is_empty() {
                return false;
            }
            let (expr_part, jdbc_type) = match inner.split_once(',') {
                Some((e, rest)) => {
                    let jt = rest
                        .split(',')
                        .find_map(|kv| kv.trim().strip_prefix("jdbcType=").map(|v| v.trim().to_string()));
                    (e.trim(), jt)
                }
                None => (inner, None),
            };
            self.append_node(Node::Param {
                expr: expr_part.to_string(),
                jdbc_type,
            });
            self.pos += end + 1;
            return true;
        }
        if remaining.starts_with("${")
            && let Some(end) = remaining.find('}')
        {
            let inner = remaining[2..end].trim();
            if inner.is_empty() {
                return false;
            }
            self.append_node(Node::Substitute(inner.to_string()));
            self.pos += end + 1;
            return true;
        }
        false
    }

    fn parse_text(&mut self) {
        let remaining = &self.template[self.pos..];
        let next_tag = remaining.find('<').unwrap_or(remaining.len());
        let next_hash = remaining.find("#{").unwrap_or(remaining.len());
        let next_dollar = remaining.find("${").unwrap_or(remaining.len());
        let next_stop = next_tag.min(next_hash).min(next_dollar);

        if next_stop > 0 {
            self.append_text(&remaining[..next_stop]);
            self.pos += next_stop;
        } else {
            self.append_text(&remaining[0..1]);
            self.pos += 1;
        }
    }

    fn append_node(&mut self, node: Node) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            nodes.push(node);
        }
    }

    fn append_text(&mut self, text: &str) {
        if let Some(nodes) = self.nodes_stack.last_mut() {
            if let Some(Node::Text(last)) = nodes.last_mut() {
                last.push_str(text);
            } else {
                nodes.push(Node::Text(text.to_string()));
            }
        }
    }

    fn close_remaining_tags(&mut self) {
        while let Some(frame) = self.tag_stack.pop() {
            let mut body = self.nodes_stack.pop().unwrap_or_default();
            self.trim_text_nodes(&mut body);
            self.close_frame(frame, body);
        }
    }
}

/// Parses the opening of a tag: `<name attr="value" ...>` or
/// `<name attr="value" .../>`. Returns the tag name, the raw attribute
/// source, whether it was self-closed, and how many bytes it consumed.
fn parse_open_tag(s: &str) -> Option<(String, String, bool, usize)> {
    if !s.starts_with('<') {
        return None;
    }
    let rest = &s[1..];
    let first = rest.chars().next()?;
    if !first.is_alphabetic() {
        return None;
    }
    let name_end = rest
        .find(|c: char| !c.is_alphanumeric() && c != '_')
        .unwrap_or(rest.len());
    let name = &rest[..name_end];
    let after_name = &rest[name_end..];
    let end_idx = find_tag_end(after_name)?;
    let mut attrs_src = &after_name[..end_idx];
    let mut self_closing = false;
    let attrs_trimmed_end = attrs_src.trim_end();
    if let Some(stripped) = attrs_trimmed_end.strip_suffix('/') {
        self_closing = true;
        attrs_src = stripped;
    }
    let consumed = 1 + name_end + end_idx + 1;
    Some((name.to_string(), attrs_src.to_string(), self_closing, consumed))
}

fn find_tag_end(s: &str) -> Option<usize> {
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            in_quote = !in_quote;
        } else if c == '>' && !in_quote {
            return Some(i);
        }
    }
    None
}

fn parse_attributes(content: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut rest = content;
    while !rest.is_empty() {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let key_end = rest
            .find(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .unwrap_or(rest.len());
        if key_end == 0 {
            rest = &rest[1..];
            continue;
        }
        let key = &rest[..key_end];
        rest = rest[key_end..].trim_start();

        if !rest.starts_with('=') {
            continue;
        }
        rest = rest[1..].trim_start();

        if rest.is_empty() {
            break;
        }
        let quote = rest.chars().next().unwrap();
        if quote != '"' && quote != '\'' {
            continue;
        }
        rest = &rest[1..];

        if let Some(val_end) = rest.find(quote) {
            attrs.insert(key.to_string(), rest[..val_end].to_string());
            rest = &rest[val_end + 1..];
        } else {
            break;
        }
    }
    attrs
}

fn split_overrides(raw: Option<&String>) -> Vec<String> {
    match raw {
        Some(s) => s.split('|').map(|p| p.to_string()).collect(),
        None => Vec::new(),
    }
}

/// Parses a statement body into a dynamic SQL tree.
pub fn parse(template: &str) -> Vec<Node> {
    Parser::new(template).parse()
}
