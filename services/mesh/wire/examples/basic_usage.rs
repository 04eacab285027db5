//! Basic usage example for the linkmesh wire protocol.

use mesh_wire::{unframe, Address, MessageBuilder, ParseEvent, StreamParser};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== linkmesh Wire Protocol Example ===\n");

    // 1. Build and frame a USER message
    println!("1. Framing a USER message...");
    let framed = MessageBuilder::user()
        .dst(Address(3))
        .src(Address(1))
        .payload(b"Hello, mesh network!\0")
        .build_frame()?;
    println!("   Encoded frame size: {} bytes", framed.len());
    println!("   Frame: {:02x?}", &framed[..]);

    // 2. Decode it in one go
    println!("\n2. Unframing...");
    let msg = unframe(&framed)?;
    println!("   {} -> {}", msg.header.src, msg.header.dst);
    println!("   Payload: {:?}", String::from_utf8_lossy(&msg.payload));

    // 3. Stream parsing with noise and split reads
    println!("\n3. Stream parsing...");
    let mut stream = vec![0xDE, 0xAD, 0xBE, 0xEF];
    stream.extend_from_slice(&framed);
    stream.extend_from_slice(&MessageBuilder::discovery().src(Address(1)).build_frame()?);

    let mut parser = StreamParser::default();
    for chunk in stream.chunks(7) {
        parser.feed(chunk, |event| match event {
            ParseEvent::Message(msg) => println!(
                "   message type {:?} from {} ({} payload bytes)",
                msg.header.ctl.message_type(),
                msg.header.src,
                msg.payload.len()
            ),
            ParseEvent::Resync(err) => println!("   resync: {}", err),
            ParseEvent::Failed(err) => println!("   failed: {}", err),
        });
    }

    println!("\n=== Example completed successfully! ===");
    Ok(())
}
