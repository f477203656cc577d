pub const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS auth_users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        full_name TEXT,
        avatar_url TEXT,
        user_type TEXT NOT NULL DEFAULT 'artist',
        bio TEXT,
        website TEXT,
        location TEXT,
        phone TEXT,
        handle TEXT UNIQUE,
        is_public INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS artworks (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        artist TEXT NOT NULL,
        year INTEGER NOT NULL,
        medium TEXT NOT NULL,
        height REAL NOT NULL,
        width REAL NOT NULL,
        depth REAL,
        unit TEXT NOT NULL,
        description TEXT,
        edition_type TEXT NOT NULL DEFAULT 'unique',
        edition_number INTEGER,
        edition_size INTEGER,
        image_url TEXT,
        status TEXT NOT NULL DEFAULT 'unverified',
        is_public INTEGER NOT NULL DEFAULT 1,
        current_certificate_id TEXT,
        active_tag_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS certificates (
        id TEXT PRIMARY KEY,
        artwork_id TEXT NOT NULL,
        certificate_id TEXT UNIQUE NOT NULL,
        qr_code_url TEXT NOT NULL,
        blockchain_hash TEXT NOT NULL,
        generated_at TEXT NOT NULL,
        FOREIGN KEY(artwork_id) REFERENCES artworks(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS nfc_tags (
        id TEXT PRIMARY KEY,
        artwork_id TEXT NOT NULL,
        nfc_uid TEXT NOT NULL,
        is_bound INTEGER NOT NULL DEFAULT 0,
        binding_status TEXT NOT NULL DEFAULT 'pending',
        created_at TEXT NOT NULL,
        FOREIGN KEY(artwork_id) REFERENCES artworks(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS verification_levels (
        id TEXT PRIMARY KEY,
        artwork_id TEXT NOT NULL,
        level TEXT NOT NULL,
        verified_by TEXT,
        created_at TEXT NOT NULL,
        FOREIGN KEY(artwork_id) REFERENCES artworks(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS collections (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS waitlist_entries (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL,
        name TEXT NOT NULL,
        role TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS survey_responses (
        id INTEGER PRIMARY KEY,
        email TEXT NOT NULL,
        responses TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_artworks_user_id ON artworks (user_id);
    CREATE INDEX IF NOT EXISTS idx_artworks_created_at ON artworks (created_at);
    CREATE INDEX IF NOT EXISTS idx_certificates_artwork_id ON certificates (artwork_id);
    CREATE INDEX IF NOT EXISTS idx_nfc_tags_artwork_id ON nfc_tags (artwork_id);
    CREATE INDEX IF NOT EXISTS idx_verification_levels_artwork_id ON verification_levels (artwork_id);
    CREATE INDEX IF NOT EXISTS idx_collections_user_id ON collections (user_id);
";
