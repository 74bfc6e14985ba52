//! Loads `<mapper>` XML into the process-wide [`Registry`](super::Registry).
//!
//! The on-disk encoding is an external collaborator; this reader exists
//! only so the in-memory model has a way to get populated
//! from something a human actually writes. A `<select>`/`<insert>`/
//! `<update>`/`<delete>` body is re-serialized to a flat string and
//! handed to [`crate::sql::parser`] — the dynamic-SQL tags (`<if>`,
//! `<where>`, `<foreach>`, ...) are this engine's own mini-language, not
//! XML quick-xml needs to understand structurally.

use crate::error::SqlweaveError;
use crate::registry::cache_config::{CacheConfig, EvictionPolicy};
use crate::registry::mapped_statement::{Command, KeyGeneratorKind, MappedStatement, StatementKind};
use crate::registry::result_map::{Discriminator, ResultMap, ResultMapping};
use crate::registry::Registry;
use crate::sql::parser;
use glob::glob;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use quick_xml::Writer;
use std::collections::HashMap;
use std::io::Cursor;

fn cfg_err(source: &str, msg: impl std::fmt::Display) -> SqlweaveError {
    SqlweaveError::Configuration(format!("{source}: {msg}"))
}

fn attr(e: &BytesStart<'_>, key: &str) -> Result<Option<String>, String> {
    for a in e.attributes() {
        let a = a.map_err(|err| err.to_string())?;
        if a.key == QName(key.as_bytes()) {
            return Ok(Some(
                a.unescape_value().map_err(|err| err.to_string())?.into_owned(),
            ));
        }
    }
    Ok(None)
}

fn required_attr(e: &BytesStart<'_>, key: &str, source: &str) -> Result<String, SqlweaveError> {
    attr(e, key)
        .map_err(|err| cfg_err(source, err))?
        .ok_or_else(|| cfg_err(source, format!("missing required attribute '{key}'")))
}

/// Re-serializes the raw inner content of an element (preserving nested
/// tags verbatim) so it can be fed to the dynamic SQL parser.
fn read_inner_xml(reader: &mut Reader<&[u8]>, end_name: QName<'_>, source: &str) -> Result<String, SqlweaveError> {
    let mut buf = Vec::new();
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut depth: usize = 0;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| cfg_err(source, e))?;
        match event {
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e.to_owned())).map_err(|e| cfg_err(source, e))?;
            }
            Event::Empty(e) => {
                writer.write_event(Event::Empty(e.to_owned())).map_err(|e| cfg_err(source, e))?;
            }
            Event::End(e) => {
                if depth == 0 && e.name() == end_name {
                    break;
                }
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e.to_owned())).map_err(|e| cfg_err(source, e))?;
            }
            Event::Text(e) => {
                writer.write_event(Event::Text(e.to_owned())).map_err(|e| cfg_err(source, e))?;
            }
            Event::CData(e) => {
                writer.write_event(Event::CData(e.to_owned())).map_err(|e| cfg_err(source, e))?;
            }
            Event::Comment(e) => {
                writer.write_event(Event::Comment(e.to_owned())).map_err(|e| cfg_err(source, e))?;
            }
            Event::Eof => return Err(cfg_err(source, "unexpected end of file inside element")),
            _ => {}
        }
    }

    String::from_utf8(writer.into_inner().into_inner()).map_err(|e| cfg_err(source, e))
}

fn command_for(tag: &str) -> Option<Command> {
    match tag {
        "select" => Some(Command::Select),
        "insert" => Some(Command::Insert),
        "update" => Some(Command::Update),
        "delete" => Some(Command::Delete),
        _ => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn parse_statement(
    reader: &mut Reader<&[u8]>,
    e: &BytesStart<'_>,
    command: Command,
    namespace: &str,
    source: &str,
) -> Result<MappedStatement, SqlweaveError> {
    let local_id = required_attr(e, "id", source)?;
    let id = format!("{namespace}.{local_id}");
    let body = read_inner_xml(reader, e.name(), source)?;
    let mut stmt = MappedStatement::new(id, command, parser::parse(&body));

    if let Some(result_map) = attr(e, "resultMap").map_err(|err| cfg_err(source, err))? {
        stmt.result_map_ids = split_list(&result_map).into_iter().map(|rm| qualify(namespace, &rm)).collect();
    }
    if let Some(cache) = attr(e, "useCache").map_err(|err| cfg_err(source, err))? {
        stmt.use_cache = parse_bool(&cache);
    }
    if let Some(flush) = attr(e, "flushCache").map_err(|err| cfg_err(source, err))? {
        stmt.flush_cache = parse_bool(&flush);
    }
    if let Some(kind) = attr(e, "statementType").map_err(|err| cfg_err(source, err))? {
        stmt.statement_kind = match kind.to_ascii_uppercase().as_str() {
            "STATEMENT" => StatementKind::Simple,
            "CALLABLE" => StatementKind::Callable,
            _ => StatementKind::Prepared,
        };
    }
    if let Some(generated) = attr(e, "useGeneratedKeys").map_err(|err| cfg_err(source, err))? {
        if parse_bool(&generated) {
            stmt.key_generator = KeyGeneratorKind::After;
        }
    }
    if let Some(kp) = attr(e, "keyProperty").map_err(|err| cfg_err(source, err))? {
        stmt.key_properties = split_list(&kp);
    }
    if let Some(kc) = attr(e, "keyColumn").map_err(|err| cfg_err(source, err))? {
        stmt.key_columns = split_list(&kc);
    }
    if let Some(fs) = attr(e, "fetchSize").map_err(|err| cfg_err(source, err))? {
        stmt.fetch_size = fs.parse().ok();
    }
    if let Some(t) = attr(e, "timeout").map_err(|err| cfg_err(source, err))? {
        stmt.timeout = t.parse().ok();
    }
    if let Some(ordered) = attr(e, "resultOrdered").map_err(|err| cfg_err(source, err))? {
        stmt.result_ordered = parse_bool(&ordered);
    }
    if let Some(db) = attr(e, "databaseId").map_err(|err| cfg_err(source, err))? {
        stmt.database_id = Some(db);
    }

    Ok(stmt)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn qualify(namespace: &str, id: &str) -> String {
    if id.contains('.') {
        id.to_string()
    } else {
        format!("{namespace}.{id}")
    }
}

/// Parses a `<resultMap>` element (including nested `<id>`, `<result>`,
/// `<association>`, `<collection>`, `<constructor>` and
/// `<discriminator>`/`<case>` children) into a [`ResultMap`].
fn parse_result_map(
    reader: &mut Reader<&[u8]>,
    e: &BytesStart<'_>,
    namespace: &str,
    source: &str,
) -> Result<ResultMap, SqlweaveError> {
    let local_id = required_attr(e, "id", source)?;
    let record_type = attr(e, "type").map_err(|err| cfg_err(source, err))?.unwrap_or_default();
    let mut result_map = ResultMap::new(format!("{namespace}.{local_id}"), record_type);
    if let Some(auto_map) = attr(e, "autoMapping").map_err(|err| cfg_err(source, err))? {
        result_map.auto_map = parse_bool(&auto_map);
    }

    let mut buf = Vec::new();
    let mut in_constructor = false;
    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|err| cfg_err(source, err))?;
        match event {
            Event::End(end) if end.name() == e.name() => break,
            Event::End(end) if end.name().as_ref() == b"constructor" => in_constructor = false,
            Event::Start(start) if start.name().as_ref() == b"constructor" => in_constructor = true,
            Event::Start(start) | Event::Empty(start) => {
                let name = start.name().as_ref().to_vec();
                match name.as_slice() {
                    b"id" | b"result" => {
                        let mut mapping = parse_mapping(&start, namespace, source, in_constructor, false)?;
                        mapping.is_id = name.as_slice() == b"id";
                        result_map.mappings.push(mapping);
                    }
                    b"association" => {
                        let mapping = parse_mapping(&start, namespace, source, false, false)?;
                        result_map.mappings.push(mapping);
                    }
                    b"collection" => {
                        let mapping = parse_mapping(&start, namespace, source, false, true)?;
                        result_map.mappings.push(mapping);
                    }
                    b"discriminator" => {
                        result_map.discriminator = Some(parse_discriminator(reader, &start, namespace, source)?);
                    }
                    _ => {}
                }
            }
            Event::Eof => return Err(cfg_err(source, "unexpected end of file inside resultMap")),
            _ => {}
        }
    }

    if let Some(extends) = attr(e, "extends").map_err(|err| cfg_err(source, err))? {
        result_map.extends = Some(qualify(namespace, &extends));
    }

    Ok(result_map)
}

fn parse_mapping(
    start: &BytesStart<'_>,
    namespace: &str,
    source: &str,
    is_constructor: bool,
    is_collection: bool,
) -> Result<ResultMapping, SqlweaveError> {
    let property = required_attr(start, "property", source)?;
    let column = attr(start, "column").map_err(|err| cfg_err(source, err))?;
    let nested_result_map_id = attr(start, "resultMap")
        .map_err(|err| cfg_err(source, err))?
        .map(|rm| qualify(namespace, &rm));
    let nested_query_id = attr(start, "select")
        .map_err(|err| cfg_err(source, err))?
        .map(|s| qualify(namespace, &s));
    let lazy = attr(start, "fetchType")
        .map_err(|err| cfg_err(source, err))?
        .map(|v| v.eq_ignore_ascii_case("lazy"))
        .unwrap_or(false);
    let not_null_columns = attr(start, "notNullColumn")
        .map_err(|err| cfg_err(source, err))?
        .map(|v| split_list(&v))
        .unwrap_or_default();
    let column_prefix = attr(start, "columnPrefix").map_err(|err| cfg_err(source, err))?;
    let result_set_name = attr(start, "resultSet").map_err(|err| cfg_err(source, err))?;
    let foreign_column = attr(start, "foreignColumn").map_err(|err| cfg_err(source, err))?;

    Ok(ResultMapping {
        property,
        column,
        nested_result_map_id,
        nested_query_id,
        lazy,
        not_null_columns,
        column_prefix,
        composites: Vec::new(),
        result_set_name,
        foreign_column,
        is_constructor,
        is_id: false,
        is_collection,
    })
}

fn parse_discriminator(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    namespace: &str,
    source: &str,
) -> Result<Discriminator, SqlweaveError> {
    let column = required_attr(start, "column", source)?;
    let mut cases = HashMap::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|err| cfg_err(source, err))?;
        match event {
            Event::End(end) if end.name() == start.name() => break,
            Event::Start(case) | Event::Empty(case) if case.name().as_ref() == b"case" => {
                let value = required_attr(&case, "value", source)?;
                let result_map = required_attr(&case, "resultMap", source)?;
                cases.insert(value, qualify(namespace, &result_map));
            }
            Event::Eof => return Err(cfg_err(source, "unexpected end of file inside discriminator")),
            _ => {}
        }
    }
    Ok(Discriminator { column, cases })
}

fn parse_cache(e: &BytesStart<'_>, namespace: &str, source: &str) -> Result<CacheConfig, SqlweaveError> {
    let mut cfg = CacheConfig::new(namespace.to_string());
    if let Some(eviction) = attr(e, "eviction").map_err(|err| cfg_err(source, err))? {
        cfg.eviction = match eviction.to_ascii_uppercase().as_str() {
            "FIFO" => EvictionPolicy::Fifo,
            _ => EvictionPolicy::Lru,
        };
    }
    if let Some(size) = attr(e, "size").map_err(|err| cfg_err(source, err))? {
        cfg.size = size.parse().map_err(|_| cfg_err(source, "invalid cache size"))?;
    }
    if let Some(interval) = attr(e, "flushInterval").map_err(|err| cfg_err(source, err))? {
        let millis: u64 = interval.parse().map_err(|_| cfg_err(source, "invalid flushInterval"))?;
        cfg.flush_interval = Some(std::time::Duration::from_millis(millis));
    }
    Ok(cfg)
}

fn parse_mapper(xml: &str, source: &str) -> Result<(), SqlweaveError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut namespace: Option<String> = None;
    let registry = Registry::global();

    loop {
        buf.clear();
        let event = reader.read_event_into(&mut buf).map_err(|e| cfg_err(source, e))?;
        match event {
            Event::Start(e) if e.name().as_ref() == b"mapper" => {
                namespace = attr(&e, "namespace").map_err(|err| cfg_err(source, err))?;
                if namespace.is_none() {
                    return Err(cfg_err(source, "<mapper> is missing a namespace attribute"));
                }
            }
            Event::Start(e) | Event::Empty(e) => {
                let ns = namespace
                    .as_deref()
                    .ok_or_else(|| cfg_err(source, "element found before <mapper namespace=\"...\">"))?;
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();

                if let Some(command) = command_for(&tag) {
                    let stmt = parse_statement(&mut reader, &e, command, ns, source)?;
                    registry.register_statement(stmt)?;
                } else if tag == "sql" {
                    let local_id = required_attr(&e, "id", source)?;
                    let body = read_inner_xml(&mut reader, e.name(), source)?;
                    registry.register_fragment(format!("{ns}.{local_id}"), parser::parse(&body));
                } else if tag == "resultMap" {
                    let rm = parse_result_map(&mut reader, &e, ns, source)?;
                    registry.register_result_map(rm)?;
                } else if tag == "cache" {
                    registry.register_cache(parse_cache(&e, ns, source)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if namespace.is_none() {
        return Err(cfg_err(source, "missing <mapper> root element"));
    }
    Ok(())
}

/// Registers mapper XML embedded at compile time via
/// `sqlweave_macros::mapper_assets!`.
pub fn load_assets(assets: Vec<(&str, &str)>) -> Result<(), SqlweaveError> {
    for (source, content) in assets {
        parse_mapper(content, source)?;
    }
    Ok(())
}

/// Loads every file matching a glob pattern (e.g. `"mappers/**/*.xml"`)
/// as mapper XML.
pub fn load_glob(pattern: &str) -> Result<(), SqlweaveError> {
    let paths = glob(pattern).map_err(|e| SqlweaveError::Configuration(e.to_string()))?;
    for entry in paths {
        let path = entry.map_err(|e| SqlweaveError::Configuration(e.to_string()))?;
        if path.is_file() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| SqlweaveError::Configuration(format!("{}: {e}", path.display())))?;
            parse_mapper(&content, &path.display().to_string())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_select_with_dynamic_where() {
        let xml = r#"
            <mapper namespace="demo.User">
                <resultMap id="userResult" type="User">
                    <id column="id" property="id"/>
                    <result column="name" property="name"/>
                </resultMap>
                <select id="findById" resultMap="userResult">
                    SELECT * FROM user <where><if test="id != null">AND id = #{id}</if></where>
                </select>
            </mapper>
        "#;
        parse_mapper(xml, "inline-test-1").unwrap();
        let registry = Registry::global();
        let stmt = registry.statement("demo.User.findById").expect("statement registered");
        assert_eq!(stmt.result_map_ids, vec!["demo.User.userResult".to_string()]);
        let rm = registry.result_map("demo.User.userResult").expect("result map registered");
        assert_eq!(rm.mappings.len(), 2);
    }

    #[test]
    fn parses_discriminator_and_cache() {
        let xml = r#"
            <mapper namespace="demo.Report">
                <cache eviction="LRU" size="512"/>
                <resultMap id="male" type="MaleReport">
                    <id column="id" property="id"/>
                </resultMap>
                <resultMap id="female" type="FemaleReport">
                    <id column="id" property="id"/>
                </resultMap>
                <resultMap id="base" type="Report">
                    <id column="id" property="id"/>
                    <discriminator column="sex">
                        <case value="1" resultMap="male"/>
                        <case value="0" resultMap="female"/>
                    </discriminator>
                </resultMap>
            </mapper>
        "#;
        parse_mapper(xml, "inline-test-2").unwrap();
        let registry = Registry::global();
        let base = registry.result_map("demo.Report.base").unwrap();
        let disc = base.discriminator.as_ref().unwrap();
        assert_eq!(disc.cases.get("1"), Some(&"demo.Report.male".to_string()));
        assert!(registry.cache_config("demo.Report").is_some());
    }

    #[test]
    fn collection_mappings_are_marked_as_collections_unlike_associations() {
        let xml = r#"
            <mapper namespace="demo.Owner">
                <resultMap id="account" type="Account">
                    <id column="id" property="id"/>
                </resultMap>
                <resultMap id="owner" type="Owner">
                    <id column="id" property="id"/>
                    <association property="profile" resultMap="account"/>
                    <collection property="accounts" resultMap="account"/>
                </resultMap>
            </mapper>
        "#;
        parse_mapper(xml, "inline-test-3").unwrap();
        let registry = Registry::global();
        let owner = registry.result_map("demo.Owner.owner").unwrap();
        let profile = owner.mappings.iter().find(|m| m.property == "profile").unwrap();
        let accounts = owner.mappings.iter().find(|m| m.property == "accounts").unwrap();
        assert!(!profile.is_collection);
        assert!(accounts.is_collection);
    }
}
