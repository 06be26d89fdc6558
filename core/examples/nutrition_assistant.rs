use nutrirag::prelude::*;
use std::path::Path;
use std::sync::Arc;

const NUTRITION_TABLE: &str = "Food,Calories,Protein,Fat,Carbohydrates,Nutrition Density
Chicken breast,165,31,3.6,0,9.1
Lentils,116,9,0.4,20,8.4
Apple,95,0.5,0.3,25,8.2
White rice,206,4.3,0.4,45,4.1
";

fn write_sample_data(dir: &Path) -> std::io::Result<()> {
    let users = dir.join("users");
    std::fs::create_dir_all(&users)?;
    std::fs::write(dir.join("nutrition.csv"), NUTRITION_TABLE)?;
    std::fs::write(
        users.join("u1.json"),
        r#"{
            "user_id": "u1",
            "name": "Ana",
            "age": 31,
            "weight": 64.5,
            "height": 168,
            "goal": "build muscle",
            "activity_level": "moderate",
            "nutrition": {"bmr": 1400, "tdee": 2170, "goal_calories": 2400},
            "chats": [
                {"timestamp": "2024-05-01T10:00:00", "user": "What should I eat after training?", "bot": "Something high in protein, like chicken breast or lentils."}
            ]
        }"#,
    )?;
    std::fs::write(
        dir.join("index.json"),
        r#"{"u1": "users/u1.json"}"#,
    )
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let dir = tempfile::tempdir()?;
    write_sample_data(dir.path())?;

    let config = RetrieverConfig::from_json(&format!(
        r#"{{
            "persist_path": "{index}",
            "nutrition_tables": ["{data}/*.csv"],
            "embedding": {{"provider": "hashing", "dimensions": 512}}
        }}"#,
        index = dir.path().join("index").display(),
        data = dir.path().display(),
    ))?;
    let users = Arc::new(JsonUserStore::from_index(dir.path().join("index.json")));
    let retriever = Retriever::from_config(&config, users).await?;

    let report = retriever.index_all_sources().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let filter = Filter::source_kind(SourceKind::Nutrition);
    for hit in retriever.retrieve("high protein food", 2, Some(&filter)).await? {
        println!("{:.3} {}", hit.score.unwrap_or_default(), hit.text);
    }

    let context = retriever.load_user_context("u1").await;
    println!("{}", serde_json::to_string_pretty(&context)?);
    Ok(())
}
