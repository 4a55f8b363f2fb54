use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use lantern::http::FILENAME_LEN;
use lantern::http::mime::{DEFAULT_CONTENT_TYPE, content_type};
use lantern::http::parser::HttpCode;
use lantern::http::resource::{MappedFile, resolve};

fn write_file(path: &Path, content: &[u8], mode: u32) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
}

#[test]
fn test_resolve_appends_target_to_root() {
    assert_eq!(
        resolve(Path::new("/srv/www"), "/index.html"),
        Ok(PathBuf::from("/srv/www/index.html"))
    );
    assert_eq!(
        resolve(Path::new("/srv/www"), "/a/b/c.css"),
        Ok(PathBuf::from("/srv/www/a/b/c.css"))
    );
}

#[test]
fn test_resolve_rejects_traversal() {
    for url in ["/../etc/passwd", "/a/../../b", "/a/.."] {
        assert_eq!(
            resolve(Path::new("/srv/www"), url),
            Err(HttpCode::ForbiddenRequest),
            "{url}"
        );
    }
}

#[test]
fn test_resolve_allows_dots_inside_names() {
    assert!(resolve(Path::new("/srv"), "/..hidden").is_ok());
    assert!(resolve(Path::new("/srv"), "/a..b/c").is_ok());
}

#[test]
fn test_resolve_rejects_overlong_path() {
    let root = Path::new("/srv");
    let fits = format!("/{}", "a".repeat(FILENAME_LEN - root.as_os_str().len() - 2));
    let too_long = format!("/{}", "a".repeat(FILENAME_LEN - root.as_os_str().len() - 1));

    assert!(resolve(root, &fits).is_ok());
    assert_eq!(resolve(root, &too_long), Err(HttpCode::BadRequest));
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = MappedFile::open(&dir.path().join("nope.html")).unwrap_err();
    assert_eq!(err, HttpCode::NoResource);
}

#[test]
fn test_open_directory_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    fs::set_permissions(&sub, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(MappedFile::open(&sub).unwrap_err(), HttpCode::ForbiddenRequest);
}

#[test]
fn test_open_not_world_readable_is_forbidden() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secret.txt");
    write_file(&path, b"top secret", 0o640);

    assert_eq!(MappedFile::open(&path).unwrap_err(), HttpCode::ForbiddenRequest);
}

#[test]
fn test_open_maps_file_contents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.html");
    write_file(&path, b"<h1>hi</h1>", 0o644);

    let file = MappedFile::open(&path).unwrap();
    assert_eq!(file.as_bytes(), b"<h1>hi</h1>");
    assert_eq!(file.len(), 11);
    assert_eq!(file.metadata().len(), 11);
}

#[test]
fn test_open_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    write_file(&path, b"", 0o644);

    let file = MappedFile::open(&path).unwrap();
    assert!(file.is_empty());
    assert_eq!(file.as_bytes(), b"");
}

#[test]
fn test_content_type_by_extension() {
    assert_eq!(content_type(Path::new("/r/index.html")), "text/html");
    assert_eq!(content_type(Path::new("/r/page.htm")), "text/html");
    assert_eq!(content_type(Path::new("/r/style.css")), "text/css");
    assert_eq!(content_type(Path::new("/r/app.js")), "application/javascript");
    assert_eq!(content_type(Path::new("/r/logo.PNG")), "image/png");
    assert_eq!(content_type(Path::new("/r/photo.jpeg")), "image/jpeg");
    assert_eq!(content_type(Path::new("/r/notes.txt")), "text/plain");
}

#[test]
fn test_content_type_fallback() {
    assert_eq!(content_type(Path::new("/r/Makefile")), DEFAULT_CONTENT_TYPE);
    assert_eq!(content_type(Path::new("/r/archive.tar.zst")), DEFAULT_CONTENT_TYPE);
}
