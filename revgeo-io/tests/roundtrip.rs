use std::thread;

use revgeo_core::geometry::Viewport;
use revgeo_core::raster::{LabelChain, LayeredRaster, WinnerGrid};
use revgeo_io::{IoError, ReverseGeocoder, encode_index, write_index};

/// 300x6 的网格，每像素 0.5 度：左侧国家内嵌一个城市，右侧是一条超过 256 像素的均匀带。
fn layered() -> LayeredRaster {
    let (width, height) = (300, 6);
    let mut grid = WinnerGrid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let value = match (x, y) {
                (2..=3, 2..=3) => 2,
                (0..=5, _) => 1,
                (6.., 1..=4) => 3,
                _ => 0,
            };
            grid.set(x, y, value);
        }
    }
    LayeredRaster {
        viewport: Viewport::from_extent(150.0, 3.0, 0.0, 3.0, width, height),
        grid,
        labels: vec![
            LabelChain::empty(),
            LabelChain::new("Country"),
            ["City", "Country"].into_iter().collect(),
            LabelChain::new("Ocean strip"),
            LabelChain::new("Unused"),
        ],
    }
}

fn pixel_center(viewport: &Viewport, x: usize, y: usize) -> (f32, f32) {
    let lon = (x as f64 + 0.5) * viewport.x_cover() - viewport.x_shift();
    let lat = viewport.y_shift() - (y as f64 + 0.5) * viewport.y_cover();
    (lon as f32, lat as f32)
}

#[test]
fn every_pixel_decodes_to_its_label_chain() {
    let raster = layered();
    let geocoder = ReverseGeocoder::from_bytes(&encode_index(&raster).expect("encode"))
        .expect("decode");
    assert_eq!(geocoder.len(), 4);
    assert_eq!(geocoder.width(), 300);
    assert_eq!(geocoder.height(), 6);

    for y in 0..raster.grid.height() {
        for x in 0..raster.grid.width() {
            let (lon, lat) = pixel_center(&raster.viewport, x, y);
            let expected = raster.labels[raster.grid.get(x, y) as usize].segments().to_vec();
            assert_eq!(geocoder.lookup(lon, lat), expected, "pixel ({x},{y})");
        }
    }
}

#[test]
fn written_index_can_be_reopened() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("regions.idx");
    let summary = write_index(&layered(), &path).expect("write");
    assert_eq!(summary.entity_count, 4);
    assert_eq!(summary.bytes as u64, std::fs::metadata(&path).expect("meta").len());
    assert!(!dir.path().join("regions.idx.partial").exists());

    let geocoder = ReverseGeocoder::open(&path).expect("open");
    assert_eq!(geocoder.lookup(1.25, 1.75), vec!["City", "Country"]);
    assert_eq!(geocoder.lookup(0.25, 0.25), vec!["Country"]);
    assert_eq!(geocoder.lookup(100.0, 1.5), vec!["Ocean strip"]);
    assert!(geocoder.lookup(100.0, 2.9).is_empty());
    geocoder.close();
}

#[test]
fn unwritable_output_is_a_write_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing-dir").join("regions.idx");
    let err = write_index(&layered(), &path).unwrap_err();
    assert!(matches!(err, IoError::WriteError { .. }));
    assert!(!path.exists());
}

#[test]
fn corrupt_files_are_rejected_on_open() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("junk.idx");
    std::fs::write(&path, b"definitely not an index").expect("write");
    assert!(matches!(
        ReverseGeocoder::open(&path),
        Err(IoError::BadMagic { .. })
    ));

    let bytes = encode_index(&layered()).expect("encode");
    std::fs::write(&path, &bytes[..bytes.len() / 2]).expect("write");
    assert!(matches!(ReverseGeocoder::open(&path), Err(IoError::Corrupt(_))));
}

#[test]
fn geocoder_is_shared_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ReverseGeocoder>();

    let raster = layered();
    let geocoder = ReverseGeocoder::from_bytes(&encode_index(&raster).expect("encode"))
        .expect("decode");
    let expected: Vec<Vec<String>> = (0..raster.grid.width())
        .map(|x| {
            let (lon, lat) = pixel_center(&raster.viewport, x, 2);
            geocoder.lookup(lon, lat)
        })
        .collect();

    thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for (x, want) in expected.iter().enumerate() {
                    let (lon, lat) = pixel_center(&raster.viewport, x, 2);
                    assert_eq!(&geocoder.lookup(lon, lat), want);
                }
            });
        }
    });
}

#[test]
fn batched_lookups_cover_long_rows() {
    let raster = layered();
    let geocoder = ReverseGeocoder::from_bytes(&encode_index(&raster).expect("encode"))
        .expect("decode");
    let points: Vec<(f32, f32)> = (0..raster.grid.width())
        .rev()
        .map(|x| pixel_center(&raster.viewport, x, 1))
        .collect();
    let results = geocoder.lookup_many(&points);
    assert_eq!(results.len(), 300);
    assert!(results[..294].iter().all(|labels| labels == &["Ocean strip"]));
    assert!(results[294..].iter().all(|labels| labels == &["Country"]));
}
