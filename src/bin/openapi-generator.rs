use golek_quiz_back::services::documentation;

fn main() -> anyhow::Result<()> {
    let doc = documentation::api_doc();
    println!("{}", doc.to_pretty_json()?);
    Ok(())
}
