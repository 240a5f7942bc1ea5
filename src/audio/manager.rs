use alloc::{
    boxed::Box,
    vec::Vec,
};
use core::sync::atomic::{
    AtomicBool,
    Ordering,
};

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    mutex::Mutex,
};
use embassy_time::{
    Duration,
    Timer,
    with_timeout,
};
use embedded_io::{
    Read,
    Seek,
    SeekFrom,
};

use super::{
    AudioConfig,
    MAX_TRACKS,
    PlayError,
    SAMPLE_BATCH_SIZE,
    StartupError,
    TrackId,
    TrackInfo,
    mix::{
        Batch,
        Volume,
    },
    pwm::{
        DutySink,
        PwmAudio,
        SampleClock,
    },
    slots::TrackSlots,
    wav,
};
use crate::fs::FileSystem;

/// How long `play` waits for a slot that is being read.
const PLAY_GUARD_TIMEOUT: Duration = Duration::from_millis(50);
/// Streaming task back-off when no track produced samples.
const IDLE_DELAY: Duration = Duration::from_millis(100);
const BYTES_PER_SAMPLE: usize = 2;

/// An open track: the file positioned inside its `data` chunk.
struct Stream<T> {
    file: T,
    data_start: u64,
    data_len: u32,
    remaining: u32,
    looping: bool,
    volume: Volume,
}

impl<T: Read + Seek> Stream<T> {
    fn open<F: FileSystem<File = T>>(fs: &F, info: &TrackInfo<'_>) -> Result<Self, PlayError> {
        let mut file = fs.open(info.path)?;
        let header = wav::read_header(&mut file)?;
        if header.format.channels != 1 {
            debug!("{} has {} channels, playing interleaved", info.path, header.format.channels);
        }
        Ok(Self {
            file,
            data_start: header.data_offset,
            data_len: header.data_len,
            remaining: header.data_len,
            looping: info.looping,
            volume: Volume::from_level(info.volume),
        })
    }

    /// Decode up to one batch of little-endian samples. Returns the sample count.
    ///
    /// A short read or a read error ends the data.
    fn read_batch(&mut self, batch: &mut Batch, scratch: &mut [u8]) -> usize {
        let want = scratch.len().min(self.remaining as usize);
        let mut filled = 0;
        while filled < want {
            match self.file.read(&mut scratch[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => {
                    debug!("track read failed, treating as end of data");
                    break;
                }
            }
        }
        if filled < want {
            self.remaining = 0;
        } else {
            self.remaining -= filled as u32;
        }

        let storage = batch.storage();
        let count = filled / BYTES_PER_SAMPLE;
        for (sample, bytes) in storage.iter_mut().zip(scratch[..filled].chunks_exact(BYTES_PER_SAMPLE)) {
            *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
        }
        batch.fill(count, self.volume);
        count
    }

    fn is_finished(&self) -> bool {
        (self.remaining as usize) < BYTES_PER_SAMPLE
    }

    /// Seek back to the first sample of a looping track.
    fn rewind(&mut self) -> bool {
        if !self.looping || (self.data_len as usize) < BYTES_PER_SAMPLE {
            return false;
        }
        match self.file.seek(SeekFrom::Start(self.data_start)) {
            Ok(_) => {
                self.remaining = self.data_len;
                true
            }
            Err(_) => false,
        }
    }
}

type Slot<T> = Mutex<CriticalSectionRawMutex, Option<Stream<T>>>;

/// Track control: open, stop and re-volume tracks in [`MAX_TRACKS`] slots.
///
/// Lives in a `static` (see [`mk_static!`](crate::mk_static)) so that the
/// streaming task and the alarm interrupt can borrow it.
pub struct AudioManager<F: FileSystem, C, S> {
    fs: F,
    backend: PwmAudio<C, S>,
    slots: [Slot<F::File>; MAX_TRACKS],
    booked: TrackSlots,
    running: AtomicBool,
    file_guard_timeout: Duration,
}

impl<F, C, S> AudioManager<F, C, S>
where
    F: FileSystem,
    C: SampleClock,
    S: DutySink,
{
    /// Start the PWM backend and allocate the streaming buffers.
    pub fn initialize(
        fs: F,
        clock: C,
        sink: S,
        config: AudioConfig,
    ) -> Result<(Self, Streamer), StartupError> {
        let streamer = Streamer::new()?;
        let backend = PwmAudio::startup(clock, sink, config)?;
        let manager = Self {
            fs,
            backend,
            slots: core::array::from_fn(|_| Mutex::new(None)),
            booked: TrackSlots::new(),
            running: AtomicBool::new(true),
            file_guard_timeout: config.file_guard_timeout(),
        };
        info!("audio manager ready, {} track slots", MAX_TRACKS);
        Ok((manager, streamer))
    }

    pub const fn backend(&self) -> &PwmAudio<C, S> {
        &self.backend
    }

    pub const fn file_system(&self) -> &F {
        &self.fs
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Open `info.path` in a free slot.
    pub async fn play(&self, info: &TrackInfo<'_>) -> Result<TrackId, PlayError> {
        if self.booked.is_full() {
            warn!("no free slot for {}", info.path);
            return Err(PlayError::NoFreeSlot);
        }
        for id in TrackId::all() {
            if !self.booked.try_book(id) {
                continue;
            }
            let Ok(mut slot) = with_timeout(PLAY_GUARD_TIMEOUT, self.slots[id.index()].lock()).await
            else {
                self.booked.release(id);
                continue;
            };
            if slot.is_some() {
                // Booking was reconciled away while the track still plays.
                self.booked.book(id);
                continue;
            }

            return match Stream::open(&self.fs, info) {
                Ok(stream) => {
                    *slot = Some(stream);
                    self.booked.book(id);
                    info!("playing {} in slot {}", info.path, id.index());
                    Ok(id)
                }
                Err(err) => {
                    self.booked.release(id);
                    warn!("cannot play {}: {:?}", info.path, err);
                    Err(err)
                }
            };
        }
        warn!("no free slot for {}", info.path);
        Err(PlayError::NoFreeSlot)
    }

    /// Close a track and free its slot. Returns `false` when the slot was not
    /// booked; a track that already ran out still counts until [`update`](Self::update).
    pub async fn stop(&self, id: TrackId) -> bool {
        if !self.booked.is_booked(id) {
            return false;
        }
        let closed = self.slots[id.index()].lock().await.take().is_some();
        self.booked.release(id);
        debug!("stopped slot {} (open: {})", id.index(), closed);
        true
    }

    /// Close every track. Returns how many were playing.
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for id in TrackId::all() {
            if self.stop(id).await {
                stopped += 1;
            }
        }
        stopped
    }

    /// Whether the slot is taken. Finished tracks count until [`update`](Self::update).
    pub fn is_playing(&self, id: TrackId) -> bool {
        self.booked.is_booked(id)
    }

    /// Change a track's volume level (`-16..=16`, clamped).
    pub async fn set_track_volume(&self, id: TrackId, level: i8) -> bool {
        if !self.booked.is_booked(id) {
            return false;
        }
        match self.slots[id.index()].lock().await.as_mut() {
            Some(stream) => {
                stream.volume = Volume::from_level(level);
                true
            }
            None => false,
        }
    }

    /// Free the slots of tracks that ran out. Call periodically from the
    /// control side, never from the streaming task.
    pub fn update(&self) {
        for id in self.booked.booked() {
            if let Ok(slot) = self.slots[id.index()].try_lock()
                && slot.is_none()
            {
                self.booked.release(id);
                trace!("slot {} released", id.index());
            }
        }
    }

    /// Halt streaming, close every track and stop the output.
    pub async fn destroy(&self) {
        self.running.store(false, Ordering::Release);
        let stopped = self.stop_all().await;
        self.backend.stop();
        info!("audio manager destroyed, {} tracks stopped", stopped);
    }

    /// Shut the backend down and give the hardware and file system back.
    pub fn into_parts(self) -> (F, C, S) {
        let (clock, sink) = self.backend.shutdown();
        (self.fs, clock, sink)
    }
}

/// The streaming task: reads, mixes and forwards samples.
pub struct Streamer {
    batches: Box<[Batch]>,
    scratch: [u8; SAMPLE_BATCH_SIZE * BYTES_PER_SAMPLE],
}

impl Streamer {
    fn new() -> Result<Self, StartupError> {
        let mut batches = Vec::new();
        batches
            .try_reserve_exact(MAX_TRACKS)
            .map_err(|_| StartupError::NotEnoughMemory)?;
        batches.resize(MAX_TRACKS, Batch::EMPTY);
        Ok(Self {
            batches: batches.into_boxed_slice(),
            scratch: [0; SAMPLE_BATCH_SIZE * BYTES_PER_SAMPLE],
        })
    }

    /// The batches filled by the last [`pump`](Self::pump), one per slot.
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// One streaming iteration. Returns the number of samples forwarded.
    pub async fn pump<F, C, S>(&mut self, audio: &AudioManager<F, C, S>) -> usize
    where
        F: FileSystem,
        C: SampleClock,
        S: DutySink,
    {
        let mut active = 0;
        let mut longest = 0;
        let mut last_active = 0;

        for (index, (slot, batch)) in audio.slots.iter().zip(self.batches.iter_mut()).enumerate() {
            batch.clear();
            let Ok(mut slot) = with_timeout(audio.file_guard_timeout, slot.lock()).await else {
                trace!("slot {} busy, skipped", index);
                continue;
            };
            let Some(stream) = slot.as_mut() else {
                continue;
            };

            let read = stream.read_batch(batch, &mut self.scratch);
            active += 1;
            last_active = index;
            longest = longest.max(read);

            if stream.is_finished() && !stream.rewind() {
                debug!("slot {} finished", index);
                *slot = None;
            }
        }

        if longest == 0 {
            return 0;
        }
        if active == 1 {
            let batch = &self.batches[last_active];
            audio.backend.send_sample(batch.samples(), batch.volume()).await;
        } else {
            audio.backend.send_samples(&self.batches, longest, active).await;
        }
        longest
    }

    /// Pump until the manager is destroyed.
    pub async fn run<F, C, S>(mut self, audio: &AudioManager<F, C, S>)
    where
        F: FileSystem,
        C: SampleClock,
        S: DutySink,
    {
        info!("audio streaming started");
        while audio.is_running() {
            if self.pump(audio).await == 0 {
                Timer::after(IDLE_DELAY).await;
            }
        }
        info!("audio streaming stopped");
    }
}
