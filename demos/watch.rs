use std::time::Duration;

#[tokio::main]
pub async fn main(){
    let transport = battereg::SerialTransport::open("/dev/ttyUSB0", 115200, Duration::from_secs(1)).unwrap();
    let mut client = battereg::RegisterClient::new(transport);
    client.drain_boot_noise().await.unwrap();
    loop {
        let outcome = client.read_register(0x0064).await.unwrap();
        println!("{outcome:?}");
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
