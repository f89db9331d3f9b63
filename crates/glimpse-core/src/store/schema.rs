pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS cameras (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    make TEXT NOT NULL,
    model TEXT NOT NULL,
    UNIQUE (make, model)
);

CREATE TABLE IF NOT EXISTS lenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    make TEXT NOT NULL,
    model TEXT NOT NULL,
    UNIQUE (make, model)
);

CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    folder_id INTEGER NOT NULL REFERENCES folders(id),
    filename TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    file_size INTEGER NOT NULL,
    width INTEGER,
    height INTEGER,
    taken_at TEXT,
    modified_at TEXT NOT NULL,

    -- taken_at, else modified_at; what every listing sorts on
    sort_date TEXT NOT NULL,
    sort_month INTEGER NOT NULL,

    camera_id INTEGER REFERENCES cameras(id),
    lens_id INTEGER REFERENCES lenses(id),
    rating INTEGER NOT NULL DEFAULT 0,
    caption TEXT,

    -- comma-separated size suffixes present on disk
    thumb_sizes TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_images_folder ON images(folder_id);
CREATE INDEX IF NOT EXISTS idx_images_sort_date ON images(sort_date, id);
CREATE INDEX IF NOT EXISTS idx_images_camera ON images(camera_id);
CREATE INDEX IF NOT EXISTS idx_images_lens ON images(lens_id);

-- Perceptual hash split into four hex parts for prefix/suffix lookups
CREATE TABLE IF NOT EXISTS hashes (
    image_id INTEGER PRIMARY KEY REFERENCES images(id) ON DELETE CASCADE,
    content_hash TEXT NOT NULL,
    phash1 TEXT,
    phash2 TEXT,
    phash3 TEXT,
    phash4 TEXT
);

CREATE INDEX IF NOT EXISTS idx_hashes_content ON hashes(content_hash);
CREATE INDEX IF NOT EXISTS idx_hashes_p1 ON hashes(phash1);
CREATE INDEX IF NOT EXISTS idx_hashes_p2 ON hashes(phash2);
CREATE INDEX IF NOT EXISTS idx_hashes_p3 ON hashes(phash3);
CREATE INDEX IF NOT EXISTS idx_hashes_p4 ON hashes(phash4);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    keyword TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS image_tags (
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (image_id, tag_id)
);

CREATE TABLE IF NOT EXISTS object_tags (
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    PRIMARY KEY (image_id, tag_id)
);

CREATE INDEX IF NOT EXISTS idx_image_tags_tag ON image_tags(tag_id);
CREATE INDEX IF NOT EXISTS idx_object_tags_tag ON object_tags(tag_id);

CREATE TABLE IF NOT EXISTS people (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS faces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id INTEGER NOT NULL REFERENCES images(id) ON DELETE CASCADE,
    person_id INTEGER REFERENCES people(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_faces_image ON faces(image_id);
CREATE INDEX IF NOT EXISTS idx_faces_person ON faces(person_id);

-- rowid = images.id; rebuilt per image whenever its annotations change
CREATE VIRTUAL TABLE IF NOT EXISTS image_fts USING fts5(
    keywords,
    objects,
    people,
    caption
);
"#;
