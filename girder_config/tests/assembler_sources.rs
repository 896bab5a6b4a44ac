use girder_config::{Assembler, AssemblerChoices};
use pretty_assertions::assert_eq;
use scopeguard::defer;
use serde::Deserialize;
use std::env;
use std::fs;

#[derive(Debug, PartialEq, Deserialize)]
struct Broker {
    engine: String,
    topic: String,
    connstring: String,
}

#[test]
fn files_then_environment() {
    // Given
    let dir = env::temp_dir().join(format!("girder-assembler-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    defer! { let _ = fs::remove_dir_all(&dir); }
    fs::write(
        dir.join("10-base.toml"),
        "[broker]\nengine = \"mem\"\ntopic = \"tasks\"\nconnstring = \"none\"\n",
    )
    .unwrap();
    fs::write(dir.join("20-override.yaml"), "broker:\n  topic: jobs\n").unwrap();
    unsafe {
        env::set_var("GIRDERTEST__BROKER__CONNSTRING", "guest:guest@localhost:5672");
    }
    let choices = AssemblerChoices {
        dir_name: Some(dir.to_string_lossy().into_owned()),
        env_enabled: true,
        env_prefix: Some("GIRDERTEST".to_string()),
        env_separator: Some("__".to_string()),
    };

    // When
    let broker = Assembler::make_builder(&choices)
        .build()
        .unwrap()
        .get::<Broker>("broker")
        .unwrap();

    // Then
    assert_eq!(
        broker,
        Broker {
            engine: "mem".to_string(),
            topic: "jobs".to_string(),
            connstring: "guest:guest@localhost:5672".to_string(),
        },
    );
}
