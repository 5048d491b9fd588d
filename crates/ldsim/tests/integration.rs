//! Integration tests for the full toolchain pipeline.

use ldsim::{
    archive, build_shared, compile, decode_executable, decode_shared, encode_executable,
    encode_shared, link, Loader, Pipeline, RelocationStrategy, BASE_START,
};

const SUM_UNIT: &str = "\
extern mul

section code
sum_and_mul:
    db 0x55
    ref rel mul
    db 0xc3
";

const MUL_UNIT: &str = "\
section code
mul:
    db 0x0f 0xaf 0xc3
";

const MAIN_UNIT: &str = "\
extern sum_and_mul

section code
main:
    ref rel sum_and_mul
    db 0xc3
";

fn static_library() -> ldsim::Archive {
    archive(
        None,
        "libstatic_library.a",
        vec![
            compile("sum", SUM_UNIT).unwrap(),
            compile("mul", MUL_UNIT).unwrap(),
        ],
        vec!["sum".to_string(), "mul".to_string()],
    )
    .unwrap()
}

#[test]
fn test_static_scenario_end_to_end() {
    // compile sum + mul, archive them, link a program that only names
    // sum_and_mul; mul must ride in transitively and nothing may stay
    // undefined.
    let mut pipeline = Pipeline::new();
    pipeline.add_library(static_library());

    let program = pipeline.compile_unit("main", MAIN_UNIT).unwrap();
    let exe = pipeline.link_program(&program).unwrap();

    assert!(exe.resolved_symbols.contains_key("sum_and_mul"));
    assert!(exe.resolved_symbols.contains_key("mul"));
    assert!(exe.is_static());
    assert!(exe.pending_relocs.is_empty());
    assert!(exe.got_slots.is_empty());

    // A static image loads with nothing left to bind.
    let runtime = pipeline.run(exe).unwrap();
    assert!(runtime.images.is_empty());
    assert!(runtime.got_table.is_empty());
}

#[test]
fn test_undefined_reference_diagnostic() {
    let program = compile("main", MAIN_UNIT).unwrap();
    let err = link(&program, &[], &[]).unwrap_err();
    assert_eq!(err.to_string(), "undefined reference to 'sum_and_mul'");
}

#[test]
fn test_dynamic_scenario_end_to_end() {
    let image = build_shared(
        "libshared_library.so",
        &[
            compile("sum", SUM_UNIT).unwrap(),
            compile("mul", MUL_UNIT).unwrap(),
        ],
    )
    .unwrap();
    let export_offset = image.export("sum_and_mul").unwrap();

    let mut pipeline = Pipeline::new();
    pipeline.add_shared_image(image);

    let program = pipeline.compile_unit("main", MAIN_UNIT).unwrap();
    let exe = pipeline.link_program(&program).unwrap();
    assert_eq!(
        exe.dynamic_dependencies,
        vec!["libshared_library.so".to_string()]
    );

    let runtime = pipeline.run(exe).unwrap();
    assert_eq!(
        runtime.base_of("libshared_library.so"),
        Some(BASE_START)
    );
    assert_eq!(
        runtime.got_table["sum_and_mul"],
        BASE_START + export_offset
    );
}

#[test]
fn test_library_not_found_diagnostic() {
    let image = build_shared(
        "libshared_library.so",
        &[compile("sum", SUM_UNIT).unwrap(), compile("mul", MUL_UNIT).unwrap()],
    )
    .unwrap();
    let program = compile("main", MAIN_UNIT).unwrap();
    let exe = link(&program, &[], &[image]).unwrap();

    // Fresh loader, empty search path: the dependency cannot be found.
    let mut loader = Loader::new(RelocationStrategy::PositionIndependent);
    let err = loader.load(exe).unwrap_err();
    assert_eq!(err.to_string(), "libshared_library.so => not found");
    assert_eq!(loader.state(), ldsim::LoadState::Failed);
}

#[test]
fn test_binding_strategies_agree_on_resolution() {
    let image = build_shared(
        "libshared_library.so",
        &[
            compile("sum", SUM_UNIT).unwrap(),
            compile("mul", MUL_UNIT).unwrap(),
        ],
    )
    .unwrap();
    let program = compile("main", MAIN_UNIT).unwrap();

    let run_with = |strategy: RelocationStrategy| {
        let mut pipeline = Pipeline::new().with_strategy(strategy);
        pipeline.add_shared_image(image.clone());
        let exe = pipeline.link_program(&program).unwrap();
        pipeline.run(exe).unwrap()
    };

    let pic = run_with(RelocationStrategy::PositionIndependent);
    let eager = run_with(RelocationStrategy::LoadTimeRelocation);

    // Same logical resolution either way; only the eager strategy may have
    // touched section bytes.
    assert_eq!(pic.got_table, eager.got_table);
    for (loaded, original) in pic.images[0].sections.iter().zip(&image.sections) {
        assert_eq!(loaded.bytes, original.bytes);
    }
}

#[test]
fn test_artifacts_survive_the_filesystem() {
    let dir = tempfile::tempdir().unwrap();

    let image = build_shared(
        "libshared_library.so",
        &[
            compile("sum", SUM_UNIT).unwrap(),
            compile("mul", MUL_UNIT).unwrap(),
        ],
    )
    .unwrap();
    let image_path = dir.path().join("libshared_library.so");
    std::fs::write(&image_path, encode_shared(&image)).unwrap();

    let program = compile("main", MAIN_UNIT).unwrap();
    let on_disk = decode_shared(&std::fs::read(&image_path).unwrap()).unwrap();
    let exe = link(&program, &[], &[on_disk]).unwrap();

    let exe_path = dir.path().join("a.out");
    std::fs::write(&exe_path, encode_executable(&exe)).unwrap();
    let exe = decode_executable(&std::fs::read(&exe_path).unwrap()).unwrap();

    // The loader finds the dependency through the search path.
    let mut loader = Loader::new(RelocationStrategy::PositionIndependent)
        .with_search_path(vec![dir.path().to_path_buf()]);
    let runtime = loader.load(exe).unwrap();
    assert_eq!(loader.state(), ldsim::LoadState::Ready);
    assert!(runtime.got_table.contains_key("sum_and_mul"));
}
