#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pose_coach::run().await
}
