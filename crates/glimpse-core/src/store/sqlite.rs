//! SQLite persistence with an FTS5 text index.

use chrono::{Datelike, NaiveDateTime};
use rusqlite::{params, params_from_iter, Connection, Row, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::records::*;
use super::schema::SCHEMA;
use super::{folder_key, AnnotationStore, ImageStore};
use crate::error::{StoreError, StoreResult};
use crate::search::{render, CompiledQuery};
use crate::types::{
    CameraId, FolderId, ImageHashes, ImageId, LensId, PersonId, TagId, ThumbSize,
};

/// Stay well under SQLite's bound-variable limit for `IN (...)` lists.
const IN_CHUNK: usize = 500;

const IMAGE_COLUMNS: &str = "id, folder_id, filename, path, file_size, width, height, taken_at, \
     modified_at, camera_id, lens_id, rating, caption, thumb_sizes";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) a database file and apply the schema.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::initialize(Connection::open(path)?)
    }

    /// Private database that disappears with the store.
    pub fn in_memory() -> StoreResult<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        tracing::debug!("SQLite schema ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn image_count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Image ids whose content hash occurs more than once, grouped.
    pub fn duplicate_groups(&self) -> StoreResult<Vec<Vec<ImageId>>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT content_hash, image_id FROM hashes \
             WHERE content_hash IN (SELECT content_hash FROM hashes WHERE content_hash <> '' \
                                    GROUP BY content_hash HAVING COUNT(*) > 1) \
             ORDER BY content_hash, image_id",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut groups: Vec<Vec<ImageId>> = Vec::new();
        let mut current: Option<String> = None;
        for (hash, id) in rows {
            if current.as_deref() != Some(hash.as_str()) {
                groups.push(Vec::new());
                current = Some(hash);
            }
            if let Some(group) = groups.last_mut() {
                group.push(ImageId(id));
            }
        }
        Ok(groups)
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn format_date(date: NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(field: &'static str, value: &str) -> StoreResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT).map_err(|_| StoreError::Corrupt {
        field,
        value: value.to_string(),
    })
}

fn format_thumb_sizes(sizes: &[ThumbSize]) -> String {
    let mut sizes = sizes.to_vec();
    sizes.sort();
    sizes.dedup();
    sizes.iter().map(|s| s.suffix()).collect::<Vec<_>>().join(",")
}

fn parse_thumb_sizes(value: &str) -> StoreResult<Vec<ThumbSize>> {
    value
        .split(',')
        .filter(|s| !s.is_empty())
        .map(|s| {
            ThumbSize::from_suffix(s).ok_or_else(|| StoreError::Corrupt {
                field: "thumb_sizes",
                value: value.to_string(),
            })
        })
        .collect()
}

/// Row shape before dates and sizes are interpreted.
struct RawImage {
    id: i64,
    folder_id: i64,
    filename: String,
    path: String,
    file_size: i64,
    width: Option<u32>,
    height: Option<u32>,
    taken_at: Option<String>,
    modified_at: String,
    camera_id: Option<i64>,
    lens_id: Option<i64>,
    rating: u8,
    caption: Option<String>,
    thumb_sizes: String,
}

impl RawImage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            filename: row.get(2)?,
            path: row.get(3)?,
            file_size: row.get(4)?,
            width: row.get(5)?,
            height: row.get(6)?,
            taken_at: row.get(7)?,
            modified_at: row.get(8)?,
            camera_id: row.get(9)?,
            lens_id: row.get(10)?,
            rating: row.get(11)?,
            caption: row.get(12)?,
            thumb_sizes: row.get(13)?,
        })
    }

    fn into_record(self) -> StoreResult<ImageRecord> {
        Ok(ImageRecord {
            id: ImageId(self.id),
            folder_id: FolderId(self.folder_id),
            filename: self.filename,
            path: PathBuf::from(self.path),
            file_size: self.file_size.max(0) as u64,
            width: self.width,
            height: self.height,
            taken_at: self
                .taken_at
                .as_deref()
                .map(|t| parse_date("taken_at", t))
                .transpose()?,
            modified_at: parse_date("modified_at", &self.modified_at)?,
            camera_id: self.camera_id.map(CameraId),
            lens_id: self.lens_id.map(LensId),
            rating: self.rating,
            caption: self.caption,
            thumb_sizes: parse_thumb_sizes(&self.thumb_sizes)?,
        })
    }
}

fn ensure_image(conn: &Connection, id: ImageId) -> StoreResult<()> {
    match conn.query_row("SELECT 1 FROM images WHERE id = ?", [id.0], |_| Ok(())) {
        Ok(()) => Ok(()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(StoreError::NotFound {
            kind: "image",
            id: id.0,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Get-or-create a make/model row in `cameras` or `lenses`.
fn make_model_id(tx: &Transaction<'_>, table: &str, (make, model): (String, String)) -> StoreResult<i64> {
    tx.execute(
        &format!("INSERT INTO {table} (make, model) VALUES (?, ?) ON CONFLICT(make, model) DO NOTHING"),
        params![make, model],
    )?;
    Ok(tx.query_row(
        &format!("SELECT id FROM {table} WHERE make = ? AND model = ?"),
        params![make, model],
        |row| row.get(0),
    )?)
}

/// Rewrite one image's full-text row from its current annotations.
fn refresh_fts(conn: &Connection, id: ImageId) -> StoreResult<()> {
    let joined = |sql: &str| -> rusqlite::Result<String> {
        let mut stmt = conn.prepare_cached(sql)?;
        let words = stmt
            .query_map([id.0], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(words.join(" "))
    };
    let keywords = joined(
        "SELECT tags.keyword FROM image_tags JOIN tags ON tags.id = image_tags.tag_id \
         WHERE image_tags.image_id = ?",
    )?;
    let objects = joined(
        "SELECT tags.keyword FROM object_tags JOIN tags ON tags.id = object_tags.tag_id \
         WHERE object_tags.image_id = ?",
    )?;
    let people = joined(
        "SELECT DISTINCT people.name FROM faces JOIN people ON people.id = faces.person_id \
         WHERE faces.image_id = ?",
    )?;
    let caption: Option<String> =
        conn.query_row("SELECT caption FROM images WHERE id = ?", [id.0], |row| row.get(0))?;

    conn.execute("DELETE FROM image_fts WHERE rowid = ?", [id.0])?;
    conn.execute(
        "INSERT INTO image_fts (rowid, keywords, objects, people, caption) VALUES (?, ?, ?, ?, ?)",
        params![id.0, keywords, objects, people, caption.unwrap_or_default()],
    )?;
    Ok(())
}

impl ImageStore for SqliteStore {
    fn get_image(&self, id: ImageId) -> StoreResult<Option<ImageRecord>> {
        let conn = self.lock();
        let result = conn.query_row(
            &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?"),
            [id.0],
            RawImage::from_row,
        );
        match result {
            Ok(raw) => raw.into_record().map(Some),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn register_image(&self, image: &NewImage) -> StoreResult<ImageId> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let folder = folder_key(&image.path);
        tx.execute(
            "INSERT INTO folders (path) VALUES (?) ON CONFLICT(path) DO NOTHING",
            [&folder],
        )?;
        let folder_id: i64 =
            tx.query_row("SELECT id FROM folders WHERE path = ?", [&folder], |row| row.get(0))?;
        let camera_id = image
            .camera()
            .map(|c| make_model_id(&tx, "cameras", c))
            .transpose()?;
        let lens_id = image
            .lens()
            .map(|l| make_model_id(&tx, "lenses", l))
            .transpose()?;

        let (width, height) = image.display_dimensions();
        let sort_date = image.exif.taken_at.unwrap_or(image.modified_at);
        let path = image.path.to_string_lossy();
        let filename = image
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // rating, caption and thumbnail state survive a re-scan
        tx.execute(
            "INSERT INTO images (folder_id, filename, path, file_size, width, height, taken_at, \
                                 modified_at, sort_date, sort_month, camera_id, lens_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(path) DO UPDATE SET \
                folder_id = excluded.folder_id, filename = excluded.filename, \
                file_size = excluded.file_size, width = excluded.width, height = excluded.height, \
                taken_at = excluded.taken_at, modified_at = excluded.modified_at, \
                sort_date = excluded.sort_date, sort_month = excluded.sort_month, \
                camera_id = excluded.camera_id, lens_id = excluded.lens_id",
            params![
                folder_id,
                filename,
                path,
                to_i64(image.file_size),
                width,
                height,
                image.exif.taken_at.map(format_date),
                format_date(image.modified_at),
                format_date(sort_date),
                sort_date.month(),
                camera_id,
                lens_id,
            ],
        )?;
        let id: i64 = tx.query_row("SELECT id FROM images WHERE path = ?", [&path], |row| row.get(0))?;
        tx.commit()?;
        Ok(ImageId(id))
    }

    fn upsert_hash(&self, id: ImageId, hashes: &ImageHashes) -> StoreResult<()> {
        let conn = self.lock();
        ensure_image(&conn, id)?;
        let [p1, p2, p3, p4] = match hashes.perceptual {
            Some(p) => p.parts().map(Some),
            None => [None, None, None, None],
        };
        conn.execute(
            "INSERT INTO hashes (image_id, content_hash, phash1, phash2, phash3, phash4) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(image_id) DO UPDATE SET content_hash = excluded.content_hash, \
                phash1 = excluded.phash1, phash2 = excluded.phash2, \
                phash3 = excluded.phash3, phash4 = excluded.phash4",
            params![id.0, hashes.content_hash, p1, p2, p3, p4],
        )?;
        Ok(())
    }

    fn get_hash(&self, id: ImageId) -> StoreResult<Option<HashRecord>> {
        Ok(self.get_hashes(&[id])?.into_iter().next())
    }

    fn get_hashes(&self, ids: &[ImageId]) -> StoreResult<Vec<HashRecord>> {
        let conn = self.lock();
        let mut records = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT image_id, content_hash, phash1, phash2, phash3, phash4 \
                 FROM hashes WHERE image_id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(|id| id.0)), |row| {
                let parts: [Option<String>; 4] =
                    [row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?];
                let phash_parts = match parts {
                    [Some(a), Some(b), Some(c), Some(d)] => Some([a, b, c, d]),
                    _ => None,
                };
                Ok(HashRecord {
                    image_id: ImageId(row.get(0)?),
                    content_hash: row.get(1)?,
                    phash_parts,
                })
            })?;
            for row in rows {
                records.push(row?);
            }
        }
        Ok(records)
    }

    fn upsert_thumbnail_state(&self, id: ImageId, sizes: &[ThumbSize]) -> StoreResult<()> {
        let changed = self.lock().execute(
            "UPDATE images SET thumb_sizes = ? WHERE id = ?",
            params![format_thumb_sizes(sizes), id.0],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "image", id: id.0 });
        }
        Ok(())
    }

    fn query_images(
        &self,
        query: &CompiledQuery,
        skip: usize,
        take: usize,
    ) -> StoreResult<Vec<ImageId>> {
        let sql = render(query, skip, take);
        tracing::trace!("query_images: {} {:?}", sql.sql, sql.params);

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql.sql)?;
        let ids = stmt
            .query_map(params_from_iter(sql.params.iter()), |row| row.get::<_, i64>(0))?
            .map(|id| id.map(ImageId))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn get_folder_path(&self, id: FolderId) -> StoreResult<Option<String>> {
        optional(self.lock().query_row(
            "SELECT path FROM folders WHERE id = ?",
            [id.0],
            |row| row.get(0),
        ))
    }

    fn get_tag(&self, id: TagId) -> StoreResult<Option<TagRecord>> {
        optional(self.lock().query_row(
            "SELECT keyword FROM tags WHERE id = ?",
            [id.0],
            |row| Ok(TagRecord { id, keyword: row.get(0)? }),
        ))
    }

    fn get_person(&self, id: PersonId) -> StoreResult<Option<PersonRecord>> {
        optional(self.lock().query_row(
            "SELECT name FROM people WHERE id = ?",
            [id.0],
            |row| Ok(PersonRecord { id, name: row.get(0)? }),
        ))
    }

    fn get_camera(&self, id: CameraId) -> StoreResult<Option<CameraRecord>> {
        optional(self.lock().query_row(
            "SELECT make, model FROM cameras WHERE id = ?",
            [id.0],
            |row| {
                Ok(CameraRecord {
                    id,
                    make: row.get(0)?,
                    model: row.get(1)?,
                })
            },
        ))
    }

    fn get_lens(&self, id: LensId) -> StoreResult<Option<LensRecord>> {
        optional(self.lock().query_row(
            "SELECT make, model FROM lenses WHERE id = ?",
            [id.0],
            |row| {
                Ok(LensRecord {
                    id,
                    make: row.get(0)?,
                    model: row.get(1)?,
                })
            },
        ))
    }
}

fn optional<T>(result: rusqlite::Result<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl SqliteStore {
    fn get_or_create(&self, insert: &str, select: &str, value: &str) -> StoreResult<i64> {
        let conn = self.lock();
        conn.execute(insert, [value])?;
        Ok(conn.query_row(select, [value], |row| row.get(0))?)
    }

    /// Run an annotation edit and rebuild the image's text row.
    fn annotate<F>(&self, image: ImageId, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<usize>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        ensure_image(&tx, image)?;
        edit(&tx)?;
        refresh_fts(&tx, image)?;
        tx.commit()?;
        Ok(())
    }
}

impl AnnotationStore for SqliteStore {
    fn add_tag(&self, keyword: &str) -> StoreResult<TagId> {
        self.get_or_create(
            "INSERT INTO tags (keyword) VALUES (?) ON CONFLICT(keyword) DO NOTHING",
            "SELECT id FROM tags WHERE keyword = ?",
            keyword,
        )
        .map(TagId)
    }

    fn tag_image(&self, image: ImageId, tag: TagId) -> StoreResult<()> {
        self.annotate(image, |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO image_tags (image_id, tag_id) VALUES (?, ?)",
                [image.0, tag.0],
            )
        })
    }

    fn tag_object(&self, image: ImageId, tag: TagId) -> StoreResult<()> {
        self.annotate(image, |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO object_tags (image_id, tag_id) VALUES (?, ?)",
                [image.0, tag.0],
            )
        })
    }

    fn add_person(&self, name: &str) -> StoreResult<PersonId> {
        self.get_or_create(
            "INSERT INTO people (name) VALUES (?) ON CONFLICT(name) DO NOTHING",
            "SELECT id FROM people WHERE name = ?",
            name,
        )
        .map(PersonId)
    }

    fn add_face(&self, image: ImageId, person: Option<PersonId>) -> StoreResult<()> {
        self.annotate(image, |conn| {
            conn.execute(
                "INSERT INTO faces (image_id, person_id) VALUES (?, ?)",
                params![image.0, person.map(|p| p.0)],
            )
        })
    }

    fn set_caption(&self, image: ImageId, caption: &str) -> StoreResult<()> {
        self.annotate(image, |conn| {
            conn.execute(
                "UPDATE images SET caption = ? WHERE id = ?",
                params![caption, image.0],
            )
        })
    }

    fn set_rating(&self, image: ImageId, rating: u8) -> StoreResult<()> {
        let changed = self.lock().execute(
            "UPDATE images SET rating = ? WHERE id = ?",
            params![rating, image.0],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "image", id: image.0 });
        }
        Ok(())
    }
}
