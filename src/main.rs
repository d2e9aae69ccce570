#[actix_web::main]
async fn main() -> eyre::Result<()> {
    msg_processor::run().start().await
}
