//! Runtime start-up and shutdown.
//!
//! The runtime is process-wide, so the whole lifecycle runs in one test in its
//! own binary.

use image::{ImageFormat, Rgb, RgbImage};
use pixform::logging::{self, LogLevel};
use pixform::{runtime, Config, Error, ExportParams, ImageRef, ImageType, Source, Target, Transform};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

#[test]
fn lifecycle() {
    let messages: Arc<Mutex<Vec<(LogLevel, String)>>> = Arc::default();
    let sink = Arc::clone(&messages);
    logging::logging_settings(
        Some(Box::new(move |domain: &str, level: LogLevel, message: &str| {
            assert_eq!(domain, logging::DOMAIN);
            sink.lock().unwrap().push((level, message.to_string()));
        })),
        LogLevel::Info,
    );

    assert!(!runtime::is_running());
    let config = Config {
        concurrency_level: 2,
        collect_stats: true,
        report_leaks: true,
        ..Config::default()
    };
    runtime::try_startup(Some(config)).unwrap();
    assert!(runtime::is_running());
    assert!(matches!(runtime::try_startup(None), Err(Error::AlreadyStarted)));

    {
        let mut image = ImageRef::new_from_buffer(&png(40, 30), None).unwrap();
        image.invert().unwrap();
        let out = Transform::new().resize(20, 15).apply(&image).unwrap();
        assert_eq!((out.width(), out.height()), (20, 15));

        let stats = runtime::read_memory_stats();
        assert!(stats.allocs >= 2);
        assert!(stats.mem > 0);
        assert!(stats.mem_high >= stats.mem);

        // In-memory streams are not files
        let files = runtime::read_memory_stats().files;
        let reader = Source::from_reader(Cursor::new(png(2, 2))).unwrap();
        let writer = Target::from_writer(Vec::new());
        assert_eq!(runtime::read_memory_stats().files, files);
        let dir = tempfile::tempdir().unwrap();
        let file = Target::from_path(&dir.path().join("out.png")).unwrap();
        assert_eq!(runtime::read_memory_stats().files, files + 1);
        drop((reader, writer, file));
        assert_eq!(runtime::read_memory_stats().files, files);

        // Lossless WebP tops out at 16384 pixels a side
        let wide = ImageRef::black(16385, 1).unwrap();
        assert!(wide.export(&ExportParams::new(ImageType::Webp)).is_err());
    }

    let counts = runtime::operation_counts();
    assert!(counts.get("invert").copied().unwrap_or(0) >= 1, "{counts:?}");
    assert!(!counts.is_empty());

    runtime::print_cache();
    runtime::clear_cache();
    runtime::print_object_report("lifecycle");

    runtime::shutdown();
    assert!(!runtime::is_running());
    runtime::shutdown();

    // Constructors start the runtime again on demand.
    let image = ImageRef::new_from_buffer(&png(4, 4), None).unwrap();
    assert_eq!(image.width(), 4);
    assert!(runtime::is_running());

    logging::logging_settings(None, LogLevel::Warning);
    let messages = messages.lock().unwrap();
    assert!(messages.iter().any(|(level, m)| *level == LogLevel::Warning && m.contains("already started")));
    assert!(messages.iter().any(|(level, m)| *level == LogLevel::Warning && m.contains("not started")));
    assert!(messages.iter().any(|(_, m)| m.contains("engine stopped")));
    assert!(messages.iter().any(|(level, m)| *level == LogLevel::Error && m.contains("webp: encode of 16385x1 failed")));
}
