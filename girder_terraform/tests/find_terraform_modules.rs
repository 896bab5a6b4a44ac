use girder_terraform::find_terraform_modules;
use pretty_assertions::assert_eq;
use std::path::PathBuf;

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

#[test]
fn finds_all_modules() {
    // When
    let modules = find_terraform_modules(fixtures(), Vec::<String>::new()).unwrap();

    // Then
    assert_eq!(
        modules,
        vec!["flat", "flat-non-main", "nested", "nested/multiple/levels"],
    );
}

#[test]
fn skips_excluded_modules() {
    // When
    let modules = find_terraform_modules(fixtures(), ["^nested"]).unwrap();

    // Then
    assert_eq!(modules, vec!["flat", "flat-non-main"]);
}
