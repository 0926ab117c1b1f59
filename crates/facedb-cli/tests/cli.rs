use std::io::Cursor;
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use predicates::prelude::*;

const EXTRACTOR_OUTPUT: &str = r#"[{"location":[0,10,12,2],"encoding":[0.1,0.2,0.3]},{"location":[4,30,20,16],"encoding":[0.3,0.2,0.1]}]"#;

fn facedb(db: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("facedb")?;
    cmd.env_remove("FACEDB_DB_PATH")
        .env_remove("FACEDB_EXTRACTOR")
        .arg("--db")
        .arg(db);
    Ok(cmd)
}

fn write_fixtures(dir: &Path) -> Result<(String, std::path::PathBuf)> {
    let script = dir.join("extract.sh");
    std::fs::write(
        &script,
        format!("cat > /dev/null\necho '{EXTRACTOR_OUTPUT}'\n"),
    )?;

    let img = image::RgbImage::from_pixel(32, 24, image::Rgb([90, 90, 90]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)?;
    let photo = dir.join("group.png");
    std::fs::write(&photo, buf.into_inner())?;

    Ok((format!("sh {}", script.display()), photo))
}

#[test]
fn empty_database_has_no_tags() -> Result<()> {
    let dir = tempfile::tempdir()?;
    facedb(&dir.path().join("faces.db"))?
        .arg("tags")
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
    Ok(())
}

#[test]
fn upload_requires_extractor() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (_, photo) = write_fixtures(dir.path())?;

    facedb(&dir.path().join("faces.db"))?
        .args(["upload", "--tag", "family"])
        .arg(&photo)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FACEDB_EXTRACTOR"));
    Ok(())
}

#[cfg(unix)]
#[test]
fn upload_compare_and_crop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let db = dir.path().join("faces.db");
    let (extractor, photo) = write_fixtures(dir.path())?;

    facedb(&db)?
        .env("FACEDB_EXTRACTOR", &extractor)
        .args(["upload", "-d", "group", "--tag", "family"])
        .arg(&photo)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"face_ids":[1,2]}"#));

    facedb(&db)?
        .arg("tags")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"family\""));

    facedb(&db)?
        .args(["compare", "1", "--tag", "family"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"distance\": 0.0"))
        .stdout(predicate::str::contains("\"face_id\": 2"));

    facedb(&db)?
        .args(["compare", "1", "--tag", "hell"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));

    let out = dir.path().join("face1.png");
    facedb(&db)?
        .args(["crop", "1", "-o"])
        .arg(&out)
        .assert()
        .success();
    let crop = image::open(&out)?;
    assert_eq!((crop.width(), crop.height()), (8, 12));

    Ok(())
}

#[test]
fn show_unknown_face_fails() -> Result<()> {
    let dir = tempfile::tempdir()?;
    facedb(&dir.path().join("faces.db"))?
        .args(["show", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no face with id 7"));
    Ok(())
}
