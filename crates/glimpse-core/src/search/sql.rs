//! Renders a [`CompiledQuery`] as parameterized SQLite + FTS5.
//!
//! User text only ever travels as bound parameters. The FTS match
//! expression is itself a parameter built from sanitized, quoted tokens.

use rusqlite::types::Value;

use super::compiler::{CompiledQuery, Filter};
use super::query::{FaceSearchMode, OrientationFilter};
use crate::store::DATE_FORMAT;

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct Builder {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Builder {
    fn clause(&mut self, sql: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(sql.into());
        self.params.extend(params);
    }

    fn filter(&mut self, filter: &Filter) {
        match filter {
            Filter::Text {
                terms,
                raw,
                include_objects,
                tags_only,
            } => {
                let columns = match (tags_only, include_objects) {
                    (true, true) => "{keywords objects}",
                    (true, false) => "{keywords}",
                    (false, true) => "{keywords objects people caption}",
                    (false, false) => "{keywords people caption}",
                };
                let expression = fts_expression(columns, terms);
                if *tags_only {
                    self.clause(
                        "images.id IN (SELECT rowid FROM image_fts WHERE image_fts MATCH ?)",
                        [Value::Text(expression)],
                    );
                } else {
                    let pattern = format!("%{}%", escape_like(raw));
                    self.clause(
                        "(images.id IN (SELECT rowid FROM image_fts WHERE image_fts MATCH ?) \
                         OR images.filename LIKE ? ESCAPE '\\' \
                         OR folders.path LIKE ? ESCAPE '\\')",
                        [
                            Value::Text(expression),
                            Value::Text(pattern.clone()),
                            Value::Text(pattern),
                        ],
                    );
                }
            }
            Filter::Tag {
                id,
                include_objects,
            } => {
                if *include_objects {
                    self.clause(
                        "(EXISTS (SELECT 1 FROM image_tags t WHERE t.image_id = images.id AND t.tag_id = ?) \
                         OR EXISTS (SELECT 1 FROM object_tags o WHERE o.image_id = images.id AND o.tag_id = ?))",
                        [Value::Integer(id.0), Value::Integer(id.0)],
                    );
                } else {
                    self.clause(
                        "EXISTS (SELECT 1 FROM image_tags t WHERE t.image_id = images.id AND t.tag_id = ?)",
                        [Value::Integer(id.0)],
                    );
                }
            }
            Filter::Untagged => self.clause(
                "NOT EXISTS (SELECT 1 FROM image_tags t WHERE t.image_id = images.id)",
                [],
            ),
            Filter::Folder(id) => self.clause("images.folder_id = ?", [Value::Integer(id.0)]),
            Filter::FolderTree { path } => {
                let root = path.trim_end_matches(std::path::MAIN_SEPARATOR);
                let below = format!("{}{}%", escape_like(root), std::path::MAIN_SEPARATOR);
                self.clause(
                    "(folders.path = ? OR folders.path LIKE ? ESCAPE '\\')",
                    [Value::Text(root.to_string()), Value::Text(below)],
                );
            }
            Filter::DateRange { from, to } => self.clause(
                "images.sort_date BETWEEN ? AND ?",
                [
                    Value::Text(from.format(DATE_FORMAT).to_string()),
                    Value::Text(to.format(DATE_FORMAT).to_string()),
                ],
            ),
            Filter::FileSize { min_kb, max_kb } => {
                if let Some(min) = min_kb {
                    self.clause("images.file_size >= ?", [Value::Integer(kb_to_bytes(*min))]);
                }
                if let Some(max) = max_kb {
                    self.clause("images.file_size <= ?", [Value::Integer(kb_to_bytes(*max))]);
                }
            }
            Filter::MinRating(rating) => {
                self.clause("images.rating >= ?", [Value::Integer(i64::from(*rating))])
            }
            Filter::Month(month) => {
                self.clause("images.sort_month = ?", [Value::Integer(i64::from(*month))])
            }
            Filter::Orientation(OrientationFilter::Landscape) => {
                self.clause("images.width > images.height", [])
            }
            Filter::Orientation(OrientationFilter::Portrait) => {
                self.clause("images.width <= images.height", [])
            }
            Filter::Camera(id) => self.clause("images.camera_id = ?", [Value::Integer(id.0)]),
            Filter::Lens(id) => self.clause("images.lens_id = ?", [Value::Integer(id.0)]),
            Filter::Faces(mode) => {
                let sql = match mode {
                    FaceSearchMode::HasFaces => {
                        "EXISTS (SELECT 1 FROM faces f WHERE f.image_id = images.id)"
                    }
                    FaceSearchMode::NoFaces => {
                        "NOT EXISTS (SELECT 1 FROM faces f WHERE f.image_id = images.id)"
                    }
                    FaceSearchMode::Unidentified => {
                        "EXISTS (SELECT 1 FROM faces f WHERE f.image_id = images.id AND f.person_id IS NULL)"
                    }
                    FaceSearchMode::Identified => {
                        "EXISTS (SELECT 1 FROM faces f WHERE f.image_id = images.id AND f.person_id IS NOT NULL)"
                    }
                };
                self.clause(sql, []);
            }
            Filter::Person(id) => self.clause(
                "EXISTS (SELECT 1 FROM faces f WHERE f.image_id = images.id AND f.person_id = ?)",
                [Value::Integer(id.0)],
            ),
            Filter::SimilarCandidates {
                exclude,
                prefixes,
                suffixes,
            } => {
                let mut params = vec![Value::Integer(exclude.0)];
                let mut alternatives = Vec::new();
                for (i, (prefix, suffix)) in prefixes.iter().zip(suffixes).enumerate() {
                    let column = format!("h.phash{}", i + 1);
                    alternatives.push(format!("{column} LIKE ?"));
                    alternatives.push(format!("{column} LIKE ?"));
                    params.push(Value::Text(format!("{prefix}%")));
                    params.push(Value::Text(format!("%{suffix}")));
                }
                self.clause(
                    format!(
                        "images.id <> ? AND EXISTS (SELECT 1 FROM hashes h WHERE h.image_id = images.id AND ({}))",
                        alternatives.join(" OR ")
                    ),
                    params,
                );
            }
        }
    }
}

/// `SELECT images.id ...` for one page of a compiled query.
pub fn render(query: &CompiledQuery, skip: usize, take: usize) -> SqlQuery {
    let mut builder = Builder::default();
    for filter in &query.filters {
        builder.filter(filter);
    }

    let mut sql = String::from(
        "SELECT images.id FROM images JOIN folders ON folders.id = images.folder_id",
    );
    if !builder.clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&builder.clauses.join(" AND "));
    }

    let date = query.order.date.sql();
    let mut order = Vec::new();
    if let Some(folder) = query.order.folder {
        order.push(format!("folders.path {}", folder.sql()));
    }
    order.push(format!("images.sort_date {date}"));
    order.push(format!("images.id {date}"));
    sql.push_str(" ORDER BY ");
    sql.push_str(&order.join(", "));
    sql.push_str(" LIMIT ? OFFSET ?");

    let mut params = builder.params;
    params.push(Value::Integer(clamp_i64(take)));
    params.push(Value::Integer(clamp_i64(skip)));
    SqlQuery { sql, params }
}

/// `{cols} : "tok"*` per token, all required.
fn fts_expression(columns: &str, terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("{columns} : \"{t}\"*"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn kb_to_bytes(kb: u64) -> i64 {
    i64::try_from(kb.saturating_mul(1024)).unwrap_or(i64::MAX)
}

fn clamp_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::compiler::ResultOrder;
    use crate::search::query::SortOrder;
    use crate::types::{ImageId, TagId};

    fn compiled(filters: Vec<Filter>) -> CompiledQuery {
        CompiledQuery {
            filters,
            ..CompiledQuery::all()
        }
    }

    #[test]
    fn test_no_filters() {
        let q = render(&CompiledQuery::all(), 200, 100);
        assert_eq!(
            q.sql,
            "SELECT images.id FROM images JOIN folders ON folders.id = images.folder_id \
             ORDER BY images.sort_date DESC, images.id DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(q.params, vec![Value::Integer(100), Value::Integer(200)]);
    }

    #[test]
    fn test_text_is_bound_not_inlined() {
        let q = render(
            &compiled(vec![Filter::Text {
                terms: vec!["drop".into(), "50%".into()],
                raw: "DROP 50%".into(),
                include_objects: false,
                tags_only: false,
            }]),
            0,
            10,
        );
        assert!(!q.sql.contains("DROP"));
        assert_eq!(
            q.params[0],
            Value::Text("{keywords people caption} : \"drop\"* AND {keywords people caption} : \"50%\"*".into())
        );
        assert_eq!(q.params[1], Value::Text("%DROP 50\\%%".into()));
        assert!(q.sql.contains("images.filename LIKE ? ESCAPE"));
    }

    #[test]
    fn test_tags_only_skips_path_match() {
        let q = render(
            &compiled(vec![Filter::Text {
                terms: vec!["dog".into()],
                raw: "dog".into(),
                include_objects: true,
                tags_only: true,
            }]),
            0,
            10,
        );
        assert!(!q.sql.contains("filename"));
        assert_eq!(q.params[0], Value::Text("{keywords objects} : \"dog\"*".into()));
    }

    #[test]
    fn test_folder_grouping_order() {
        let q = render(
            &CompiledQuery {
                filters: vec![Filter::Tag {
                    id: TagId(3),
                    include_objects: false,
                }],
                order: ResultOrder {
                    folder: Some(SortOrder::Descending),
                    date: SortOrder::Ascending,
                },
                similarity: None,
            },
            0,
            5,
        );
        assert!(q
            .sql
            .ends_with("ORDER BY folders.path DESC, images.sort_date ASC, images.id ASC LIMIT ? OFFSET ?"));
        assert_eq!(q.params[0], Value::Integer(3));
    }

    #[test]
    fn test_similar_candidates() {
        let q = render(
            &compiled(vec![Filter::SimilarCandidates {
                exclude: ImageId(9),
                prefixes: ["01".into(), "45".into(), "89".into(), "cd".into()],
                suffixes: ["23".into(), "67".into(), "ab".into(), "ef".into()],
            }]),
            0,
            10,
        );
        assert!(q.sql.contains("images.id <> ?"));
        assert_eq!(q.sql.matches("LIKE ?").count(), 8);
        assert_eq!(q.params[0], Value::Integer(9));
        assert_eq!(q.params[1], Value::Text("01%".into()));
        assert_eq!(q.params[2], Value::Text("%23".into()));
        assert_eq!(q.params.len(), 1 + 8 + 2);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\d"), "a\\_b\\%c\\\\d");
    }
}
