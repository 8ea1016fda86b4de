use imagegate::config::{FitMode, OutputFormat};
use imagegate::transform::params::RenditionParams;
use imagegate::transform::{ImageEngine, TransformEngine, TransformError};
use std::io::Cursor;
use std::path::PathBuf;
use tempfile::TempDir;

fn engine() -> ImageEngine {
    ImageEngine::new(85, FitMode::Max, OutputFormat::Webp)
}

fn params(pairs: &[(&str, &str)]) -> RenditionParams {
    RenditionParams::new(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
}

/// Write a solid-color PNG into `dir` and return its path.
fn write_png(dir: &TempDir, name: &str, w: u32, h: u32, rgb: [u8; 3]) -> PathBuf {
    let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
    let mut out = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    let path = dir.path().join(name);
    std::fs::write(&path, out).unwrap();
    path
}

#[tokio::test]
async fn max_fit_shrinks_but_never_upscales() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 64, [200, 0, 0]);

    let shrunk = engine()
        .render(&src, &params(&[("w", "32"), ("fm", "png")]))
        .await
        .unwrap();
    assert_eq!(image::load_from_memory(&shrunk).unwrap().width(), 32);

    let kept = engine()
        .render(&src, &params(&[("w", "128"), ("h", "128"), ("fm", "png")]))
        .await
        .unwrap();
    let kept = image::load_from_memory(&kept).unwrap();
    assert_eq!((kept.width(), kept.height()), (64, 64));
}

#[tokio::test]
async fn crop_fit_fills_the_exact_box() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 32, [200, 0, 0]);

    let out = engine()
        .render(
            &src,
            &params(&[("w", "40"), ("h", "20"), ("fit", "crop"), ("fm", "png")]),
        )
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!((img.width(), img.height()), (40, 20));
}

#[tokio::test]
async fn stretch_fit_ignores_aspect_ratio() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 32, [200, 0, 0]);

    let out = engine()
        .render(
            &src,
            &params(&[("w", "50"), ("h", "50"), ("fit", "stretch"), ("fm", "png")]),
        )
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!((img.width(), img.height()), (50, 50));
}

#[tokio::test]
async fn fill_fit_pads_to_the_exact_box() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 32, [200, 0, 0]);

    let out = engine()
        .render(
            &src,
            &params(&[("w", "30"), ("h", "30"), ("fit", "fill"), ("fm", "png")]),
        )
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap().to_rgb8();
    assert_eq!((img.width(), img.height()), (30, 30));
    // Top edge is padding, center is image
    assert_eq!(img.get_pixel(15, 0).0, [255, 255, 255]);
    assert_eq!(img.get_pixel(15, 15).0, [200, 0, 0]);
}

#[tokio::test]
async fn dpr_multiplies_requested_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 64, [200, 0, 0]);

    let out = engine()
        .render(&src, &params(&[("w", "16"), ("dpr", "2"), ("fm", "png")]))
        .await
        .unwrap();
    assert_eq!(image::load_from_memory(&out).unwrap().width(), 32);
}

#[tokio::test]
async fn rotation_swaps_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 32, [200, 0, 0]);

    let out = engine()
        .render(&src, &params(&[("rot", "90"), ("fm", "png")]))
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!((img.width(), img.height()), (32, 64));
}

#[tokio::test]
async fn explicit_crop_rectangle_is_applied_first() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 64, [200, 0, 0]);

    let out = engine()
        .render(&src, &params(&[("crop", "20,10,5,5"), ("fm", "png")]))
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap();
    assert_eq!((img.width(), img.height()), (20, 10));
}

#[tokio::test]
async fn format_conversion_changes_the_encoded_container() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 16, 16, [200, 0, 0]);

    let webp = engine()
        .render(&src, &params(&[("fm", "webp")]))
        .await
        .unwrap();
    assert_eq!(
        image::guess_format(&webp).unwrap(),
        image::ImageFormat::WebP
    );

    let jpeg = engine()
        .render(&src, &params(&[("fm", "jpg"), ("q", "80")]))
        .await
        .unwrap();
    assert_eq!(
        image::guess_format(&jpeg).unwrap(),
        image::ImageFormat::Jpeg
    );
}

#[tokio::test]
async fn source_format_is_kept_when_no_format_requested() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 16, 16, [200, 0, 0]);

    let out = engine().render(&src, &params(&[("w", "8")])).await.unwrap();
    assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Png);
}

#[tokio::test]
async fn greyscale_filter_removes_color() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 16, 16, [200, 40, 40]);

    let out = engine()
        .render(&src, &params(&[("filt", "greyscale"), ("fm", "png")]))
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap().to_rgb8();
    let [r, g, b] = img.get_pixel(8, 8).0;
    assert_eq!(r, g);
    assert_eq!(g, b);
}

#[tokio::test]
async fn watermark_is_anchored_and_respects_opacity() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 64, [200, 0, 0]);
    let mark = write_png(&dir, "logo.png", 16, 16, [0, 0, 200]);
    let mark_path = mark.to_string_lossy().into_owned();

    let out = engine()
        .render(
            &src,
            &params(&[
                ("mark", &mark_path),
                ("markpos", "top-left"),
                ("fm", "png"),
            ]),
        )
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap().to_rgb8();
    assert_eq!(img.get_pixel(0, 0).0, [0, 0, 200]);
    assert_eq!(img.get_pixel(40, 40).0, [200, 0, 0]);

    // Fully transparent watermark leaves the base untouched
    let out = engine()
        .render(
            &src,
            &params(&[
                ("mark", &mark_path),
                ("markpos", "top-left"),
                ("markalpha", "0"),
                ("fm", "png"),
            ]),
        )
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap().to_rgb8();
    assert_eq!(img.get_pixel(0, 0).0, [200, 0, 0]);
}

#[tokio::test]
async fn watermark_width_resizes_the_overlay() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 64, 64, [200, 0, 0]);
    let mark = write_png(&dir, "logo.png", 32, 32, [0, 0, 200]);
    let mark_path = mark.to_string_lossy().into_owned();

    let out = engine()
        .render(
            &src,
            &params(&[
                ("mark", &mark_path),
                ("markw", "8"),
                ("markpos", "top-left"),
                ("fm", "png"),
            ]),
        )
        .await
        .unwrap();
    let img = image::load_from_memory(&out).unwrap().to_rgb8();
    assert_eq!(img.get_pixel(4, 4).0, [0, 0, 200]);
    // Beyond the shrunken 8px overlay the base shows through
    assert_eq!(img.get_pixel(12, 12).0, [200, 0, 0]);
}

#[tokio::test]
async fn missing_watermark_file_fails_the_render() {
    let dir = tempfile::tempdir().unwrap();
    let src = write_png(&dir, "src.png", 16, 16, [200, 0, 0]);

    let err = engine()
        .render(&src, &params(&[("mark", "/nowhere/logo.png")]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::Watermark(_, _)));
}

#[tokio::test]
async fn undecodable_source_is_a_decode_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.png");
    std::fs::write(&path, b"definitely not an image").unwrap();

    let err = engine()
        .render(&path, &params(&[("w", "10")]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::Decode(_)));
}

#[tokio::test]
async fn missing_source_is_a_read_error() {
    let err = engine()
        .render(&PathBuf::from("/nowhere/src.png"), &params(&[("w", "10")]))
        .await
        .unwrap_err();
    assert!(matches!(err, TransformError::Read(_)));
}
