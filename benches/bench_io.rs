// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Benchmarks

use criterion::*;
use ehtimage::{
    load_fits, load_image, ndarray::Array5, save_fits, save_netcdf, AngularUnit, EhtImage,
    FitsConvention, ImageParams, MemoryImage, NcMode, NcOptions, PolSet,
};
use tempfile::tempdir;

// ///////////// //
// IO Benchmarks //
// ///////////// //

fn synthesize_test_image(shape: (usize, usize, usize, usize, usize)) -> MemoryImage {
    let (nx, ny, _, nf, nt) = shape;
    let params = ImageParams {
        ny,
        pol: PolSet::Full,
        freq: (0..nf).map(|f| 230e9 + f as f64 * 1e9).collect(),
        mjd: (0..nt).map(|t| 57_849.0 + t as f64 / 24.0).collect(),
        ..ImageParams::new(nx, 1.0, AngularUnit::Microarcsecond)
    };
    let data = Array5::from_shape_fn(shape, |(x, y, p, f, t)| {
        (x + y * nx + p * nx * ny + f * 4 * nx * ny + t * nf * 4 * nx * ny) as f64
    });
    MemoryImage::blank(&params).unwrap().with_data(data).unwrap()
}

fn bench_netcdf(crt: &mut Criterion) {
    let mut image = synthesize_test_image((128, 128, 4, 4, 8));

    crt.bench_function("save_netcdf - 128x128x4x4x8", |bch| {
        bch.iter(|| {
            let tmp_dir = tempdir().unwrap();
            let options = NcOptions {
                mode: NcMode::Create,
                ..NcOptions::default()
            };
            save_netcdf(&mut image, tmp_dir.path().join("image.nc"), &options).unwrap();
        })
    });

    let tmp_dir = tempdir().unwrap();
    let path = tmp_dir.path().join("image.nc");
    let options = NcOptions {
        mode: NcMode::Create,
        ..NcOptions::default()
    };
    save_netcdf(&mut image, &path, &options).unwrap();

    crt.bench_function("load_image data - 128x128x4x4x8", |bch| {
        bch.iter(|| {
            let mut disk = load_image(&path, &NcOptions::default()).unwrap();
            black_box(disk.data().unwrap());
        })
    });

    crt.bench_function("load_image slice - 128x128x4x4x8", |bch| {
        let mut disk = load_image(&path, &NcOptions::default()).unwrap();
        bch.iter(|| black_box(disk.slice(3, 2, 7).unwrap()))
    });
}

fn bench_fits(crt: &mut Criterion) {
    let mut image = synthesize_test_image((512, 512, 4, 1, 1));
    let tmp_dir = tempdir().unwrap();
    let path = tmp_dir.path().join("image.fits");

    crt.bench_function("save_fits - 512x512x4", |bch| {
        bch.iter(|| save_fits(&mut image, &path, (0, 0), FitsConvention::Casa).unwrap())
    });

    crt.bench_function("load_fits - 512x512x4", |bch| {
        bch.iter(|| black_box(load_fits(&path, 0).unwrap()))
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(20);
    targets = bench_netcdf, bench_fits
);
criterion_main!(benches);
