//////////////////////////////////////////////////////////////////////////////
//
// Decodes the drone's video with openh264 on a thread of its own, counting
// the pictures that come out
//
//////////////////////////////////////////////////////////////////////////////

extern crate tello_udp;

use openh264::decoder::Decoder;

use tello_udp::{decode_frames, DecoderError, ParameterSets, Tello, TelloOptions, TelloVideoFrame, VideoDecoder};

struct H264 {
    decoder: Decoder,
    pictures: usize,
}

impl VideoDecoder for H264 {
    fn configure(&mut self, params: &ParameterSets) -> Result<(), DecoderError> {
        // parameter sets produce no picture, they only prime the decoder
        self.decoder.decode(&params.sps)?;
        self.decoder.decode(&params.pps)?;
        Ok(())
    }

    fn decode(&mut self, frame: TelloVideoFrame) -> Result<(), DecoderError> {
        match self.decoder.decode(&frame.data)? {
            Some(_) => {
                self.pictures += 1;
                println!("picture #{} from {} bytes", self.pictures, frame.data.len());
            }
            None => println!("incomplete frame, dropped"),
        }
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut options = TelloOptions::default();

    // we want video...
    let frames = options.with_video();

    // ...decoded off the async runtime, as the decoder can't move between threads
    let decoding = std::thread::spawn(move || -> anyhow::Result<()> {
        let runtime = tokio::runtime::Builder::new_current_thread().build()?;
        let mut h264 = H264 { decoder: Decoder::new()?, pictures: 0 };
        runtime.block_on(decode_frames(frames, &mut h264, &ParameterSets::default()))?;
        println!("VIDEO END after {} pictures", h264.pictures);
        Ok(())
    });

    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async {
        let drone = Tello::new().connect_with(options).await?;

        drone.start_video().await?;

        drone.take_off().await?;
        drone.turn_clockwise(360).await?;
        drone.land().await?;

        drone.stop().await;
        anyhow::Ok(())
    })?;

    decoding.join().map_err(|_| anyhow::anyhow!("decoder thread panicked"))?
}
