use super::*;
use std::collections::BTreeSet;
use tempfile::tempdir;

fn create_test_pipeline() -> (ImagePipeline, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let pipeline = ImagePipeline::new(temp_dir.path().join("graphs"), ImageSettings::default());
    (pipeline, temp_dir)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    });
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn open_image(path: &Path) -> DynamicImage {
    let bytes = std::fs::read(path).unwrap();
    image::load_from_memory(&bytes).unwrap()
}

fn dir_entries(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

fn expected_entries() -> BTreeSet<String> {
    [MASTER_FILE, COMPRESSED_FILE, JPEG_FILE, POINTER_FILE]
        .into_iter()
        .map(String::from)
        .collect()
}

mod fit_within {
    use super::*;

    #[test]
    fn test_landscape_limited_by_width() {
        // 1440x600: width scale 0.5, height scale 0.728 -> 720x300
        assert_eq!(fit_within((1440, 600), (720, 437)), (720, 300));
    }

    #[test]
    fn test_tall_limited_by_height() {
        // 800x874: height scale 0.5 -> 400x437
        assert_eq!(fit_within((800, 874), (720, 437)), (400, 437));
    }

    #[test]
    fn test_no_upscale() {
        assert_eq!(fit_within((300, 200), (720, 437)), (300, 200));
    }

    #[test]
    fn test_exact_size() {
        assert_eq!(fit_within((720, 437), (720, 437)), (720, 437));
    }

    #[test]
    fn test_degenerate_dimension_is_at_least_one_pixel() {
        assert_eq!(fit_within((10_000, 1), (720, 437)), (720, 1));
    }

    #[test]
    fn test_stays_in_box_and_keeps_aspect_ratio() {
        let sizes = [
            (1200, 760),
            (1000, 1000),
            (3000, 417),
            (721, 438),
            (999, 1601),
            (1366, 700),
        ];
        for (w, h) in sizes {
            let (dw, dh) = fit_within((w, h), (720, 437));
            assert!(dw <= 720 && dh <= 437, "{w}x{h} -> {dw}x{dh}");

            // Aspect ratio within one pixel of rounding on the derived axis.
            let expected_h = dw as f64 * h as f64 / w as f64;
            let expected_w = dh as f64 * w as f64 / h as f64;
            assert!(
                (expected_h - dh as f64).abs() <= 1.0 || (expected_w - dw as f64).abs() <= 1.0,
                "{w}x{h} -> {dw}x{dh}"
            );
        }
    }
}

mod process {
    use super::*;

    #[test]
    fn test_publishes_four_artifacts() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(1200, 800)).unwrap();

        assert_eq!(artifacts, pipeline.artifact_set());
        assert_eq!(dir_entries(&pipeline.output_dir), expected_entries());
    }

    #[test]
    fn test_master_is_cropped_at_native_resolution() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(1200, 800)).unwrap();

        let master = open_image(&artifacts.master);
        assert_eq!(master.width(), 1200);
        assert_eq!(master.height(), 760);
    }

    #[test]
    fn test_crop_removes_bottom_rows() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(100, 300)).unwrap();

        let master = open_image(&artifacts.master).to_rgba8();
        // Green channel encodes the source row, so the last kept row is 259.
        assert_eq!(master.get_pixel(0, master.height() - 1)[1], 3);
        assert_eq!(master.height(), 260);
    }

    #[test]
    fn test_derivatives_fit_target_box() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(1200, 800)).unwrap();

        // Cropped 1200x760 -> scale min(0.6, 0.575) = 0.575 -> 690x437
        for path in [&artifacts.compressed, &artifacts.jpeg] {
            let img = open_image(path);
            assert_eq!((img.width(), img.height()), (690, 437));
        }
    }

    #[test]
    fn test_compressed_is_indexed_png() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(640, 480)).unwrap();

        let decoder = png::Decoder::new(std::fs::File::open(&artifacts.compressed).unwrap());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!(info.color_type, png::ColorType::Indexed);
        let palette = info.palette.as_ref().unwrap();
        assert!(palette.len() / 3 <= 256);
    }

    #[test]
    fn test_jpeg_is_jpeg() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(640, 480)).unwrap();

        let bytes = std::fs::read(&artifacts.jpeg).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[cfg(unix)]
    #[test]
    fn test_pointer_is_relative_symlink_to_master() {
        let (pipeline, _temp) = create_test_pipeline();

        let artifacts = pipeline.process(&png_bytes(640, 480)).unwrap();

        let meta = std::fs::symlink_metadata(&artifacts.pointer).unwrap();
        assert!(meta.file_type().is_symlink());
        assert_eq!(
            std::fs::read_link(&artifacts.pointer).unwrap(),
            PathBuf::from(MASTER_FILE)
        );
        assert_eq!(
            std::fs::read(&artifacts.pointer).unwrap(),
            std::fs::read(&artifacts.master).unwrap()
        );
    }

    #[test]
    fn test_second_run_replaces_set() {
        let (pipeline, _temp) = create_test_pipeline();

        pipeline.process(&png_bytes(640, 480)).unwrap();
        let artifacts = pipeline.process(&png_bytes(800, 600)).unwrap();

        assert_eq!(dir_entries(&pipeline.output_dir), expected_entries());
        assert_eq!(open_image(&artifacts.master).width(), 800);
        assert_eq!(open_image(&artifacts.pointer).width(), 800);
    }
}

mod failures {
    use super::*;

    #[test]
    fn test_garbage_bytes_publish_nothing() {
        let (pipeline, _temp) = create_test_pipeline();

        let result = pipeline.process(b"<html>not an image</html>");

        assert!(matches!(result, Err(ImageProcessingError::Image(_))));
        assert!(dir_entries(&pipeline.output_dir).is_empty());
    }

    #[test]
    fn test_image_shorter_than_crop_fails() {
        let (pipeline, _temp) = create_test_pipeline();

        let result = pipeline.process(&png_bytes(300, 40));

        assert!(matches!(
            result,
            Err(ImageProcessingError::TooSmall { height: 40, crop: 40 })
        ));
        assert!(dir_entries(&pipeline.output_dir).is_empty());
    }

    #[test]
    fn test_failure_keeps_previous_set_untouched() {
        let (pipeline, _temp) = create_test_pipeline();
        let artifacts = pipeline.process(&png_bytes(640, 480)).unwrap();
        let before: Vec<Vec<u8>> = [&artifacts.master, &artifacts.compressed, &artifacts.jpeg]
            .iter()
            .map(|p| std::fs::read(p).unwrap())
            .collect();

        assert!(pipeline.process(&png_bytes(640, 20)).is_err());
        assert!(pipeline.process(&[0x89, b'P', b'N', b'G']).is_err());

        let after: Vec<Vec<u8>> = [&artifacts.master, &artifacts.compressed, &artifacts.jpeg]
            .iter()
            .map(|p| std::fs::read(p).unwrap())
            .collect();
        assert_eq!(before, after);
        assert_eq!(dir_entries(&pipeline.output_dir), expected_entries());
    }

    #[test]
    fn test_failed_rename_restores_replaced_artifacts() {
        let (pipeline, _temp) = create_test_pipeline();
        let artifacts = pipeline.process(&png_bytes(640, 480)).unwrap();
        let master = std::fs::read(&artifacts.master).unwrap();
        let compressed = std::fs::read(&artifacts.compressed).unwrap();
        // A directory in place of the JPEG makes its rename fail after the
        // master and the compressed image were already replaced.
        std::fs::remove_file(&artifacts.jpeg).unwrap();
        std::fs::create_dir(&artifacts.jpeg).unwrap();
        std::fs::write(artifacts.jpeg.join("keep"), b"x").unwrap();

        let result = pipeline.process(&png_bytes(1200, 800));

        assert!(matches!(result, Err(ImageProcessingError::Io(_))));
        assert_eq!(std::fs::read(&artifacts.master).unwrap(), master);
        assert_eq!(std::fs::read(&artifacts.compressed).unwrap(), compressed);
        assert_eq!(open_image(&artifacts.pointer).width(), 640);
        assert_eq!(dir_entries(&pipeline.output_dir), expected_entries());
    }

    #[test]
    fn test_failed_rename_without_previous_set_leaves_no_artifact() {
        let (pipeline, _temp) = create_test_pipeline();
        std::fs::create_dir_all(pipeline.artifact_set().compressed.join("keep")).unwrap();

        let result = pipeline.process(&png_bytes(640, 480));

        assert!(result.is_err());
        // The master had no previous version, so it is removed again.
        assert_eq!(
            dir_entries(&pipeline.output_dir),
            BTreeSet::from(["latest_graph_compressed.png".to_string()])
        );
    }
}
