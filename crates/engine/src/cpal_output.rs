use std::cell::RefCell;
use std::sync::{Arc, Mutex};

use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use tracing::{error, info};

use crate::graph::GraphId;
use crate::mixer::{Mixer, MixerHandle, ScheduledMix, mixer};
use crate::output::{AudioOutput, OutputError};

type StreamFault = Arc<Mutex<Option<String>>>;

/// The default system output device, rendered by a [`Mixer`] in the cpal callback.
pub struct CpalOutput {
    mixer: RefCell<MixerHandle>,
    fault: StreamFault,
    stream: cpal::Stream,
}

impl CpalOutput {
    pub fn open() -> anyhow::Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| anyhow::anyhow!("no output device found"))?;

        let config = device.default_output_config()?;
        let sample_rate = config.sample_rate().0;
        let channels = config.channels();
        let (mixer, handle) = mixer(sample_rate, channels);
        let fault = StreamFault::default();

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &config.into(), mixer, Arc::clone(&fault))?
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &config.into(), mixer, Arc::clone(&fault))?
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &config.into(), mixer, Arc::clone(&fault))?
            }
            sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
        };

        stream.play()?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(device = %device_name, sample_rate, channels, "audio output opened");

        Ok(Self {
            mixer: RefCell::new(handle),
            fault,
            stream,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
    fault: StreamFault,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let mut scratch = vec![0.0f32; 4096 * config.channels as usize];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            if scratch.len() < data.len() {
                scratch.resize(data.len(), 0.0);
            }
            let rendered = &mut scratch[..data.len()];
            mixer.render(rendered);
            for (out, sample) in data.iter_mut().zip(rendered.iter()) {
                *out = T::from_sample(*sample);
            }
        },
        move |err| {
            error!(%err, "audio stream error");
            if let Ok(mut slot) = fault.lock() {
                *slot = Some(err.to_string());
            }
        },
        None,
    )?;

    Ok(stream)
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.mixer.borrow().sample_rate()
    }

    fn channels(&self) -> u16 {
        self.mixer.borrow().channels()
    }

    fn current_time(&self) -> f64 {
        self.mixer.borrow().current_time()
    }

    fn ensure_running(&self) -> Result<(), OutputError> {
        if let Some(message) = self.fault.lock().ok().and_then(|slot| slot.clone()) {
            return Err(OutputError::Device(message));
        }
        self.stream
            .play()
            .map_err(|err| OutputError::Suspended(err.to_string()))
    }

    fn connect(&self, mix: ScheduledMix) -> Result<(), OutputError> {
        self.mixer.borrow_mut().connect(mix)
    }

    fn disconnect(&self, graph: GraphId) {
        self.mixer.borrow_mut().disconnect(graph);
    }

    fn master_gain(&self) -> f32 {
        self.mixer.borrow().master_gain()
    }

    fn set_master_gain(&self, gain: f32) {
        self.mixer.borrow().set_master_gain(gain);
    }
}
