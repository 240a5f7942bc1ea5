//! Minimal game loop on top of the renderer, the audio mixer and the buttons.
//!
//! The render task presents frames while `main` runs the game: move with the
//! D-pad, shoot with A (plays a sound), pause the background loop with Start.

#![no_std]
#![no_main]

use defmt::{
    info,
    warn,
};
use embassy_executor::Spawner;
use embassy_time::{
    Duration,
    Instant,
};
use embedded_graphics::{
    mono_font::{
        MonoTextStyle,
        ascii::FONT_6X10,
    },
    pixelcolor::Rgb565,
    prelude::*,
    text::Text,
};
use esp_backtrace as _;
use esp_hal::timer::timg::TimerGroup;
use esp_println as _;
use gzn::{
    Buttons,
    Lcd,
    Speaker,
    audio::{
        AudioConfig,
        AudioManager,
        Streamer,
        TrackId,
        TrackInfo,
    },
    fs::{
        AssetFs,
        Partition,
    },
    input::{
        Action,
        Actions,
        ButtonPadTranslator,
    },
    mk_static,
    render::{
        Painter,
        Presenter,
        RenderConfig,
        Renderer,
    },
    speaker::{
        SpeakerClock,
        SpeakerDuty,
    },
    split_resources,
};

extern crate alloc;

esp_bootloader_esp_idf::esp_app_desc!();

type Audio = AudioManager<AssetFs, SpeakerClock, SpeakerDuty>;

static SOUNDS: &[(&str, &[u8])] = &[
    ("attack.wav", include_bytes!("assets/sounds/attack.wav")),
    ("hum.wav", include_bytes!("assets/sounds/hum.wav")),
];

const ATTACK: TrackInfo<'static> = TrackInfo::new("/sounds/attack.wav");
const HUM: TrackInfo<'static> = TrackInfo::new("/sounds/hum.wav")
    .with_volume(-6)
    .with_looping(true);

/// Positions are kept in 1/16 pixel.
const SUBPIXEL: i32 = 16;
const PLAYER_SIZE: Size = Size::new(3, 3);
/// Pixels per second at full deflection.
const PLAYER_SPEED: i32 = 40;
const BULLET_SPEED: i32 = 80;
const BULLET_SIZE: Size = Size::new(2, 1);
const MAX_BULLETS: usize = 16;
const GROUND_HEIGHT: u32 = 4;

#[embassy_executor::task]
async fn render_task(mut presenter: Presenter<'static>, mut lcd: Lcd<'static>) {
    loop {
        presenter.update(&mut lcd).await;
    }
}

#[embassy_executor::task]
async fn audio_task(streamer: Streamer, audio: &'static Audio) {
    streamer.run(audio).await;
}

struct FpsCounter {
    window_start: Instant,
    frames: u32,
    fps: u8,
}

impl FpsCounter {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0,
        }
    }

    fn tick(&mut self, now: Instant) -> u8 {
        self.frames += 1;
        let elapsed = now - self.window_start;
        if elapsed >= Duration::from_secs(1) {
            let per_second = u64::from(self.frames) * 1000 / elapsed.as_millis().max(1);
            self.fps = per_second.min(u64::from(u8::MAX)) as u8;
            self.frames = 0;
            self.window_start = now;
        }
        self.fps
    }
}

#[derive(Clone, Copy)]
struct Bullet {
    x: i32,
    y: i32,
    dx: i32,
}

struct Game {
    player: Point,
    facing: i32,
    bullets: [Option<Bullet>; MAX_BULLETS],
    next_bullet: usize,
    paused: bool,
}

impl Game {
    fn new(bounds: Size) -> Self {
        Self {
            player: Point::new(4 * SUBPIXEL, (bounds.height as i32 / 2) * SUBPIXEL),
            facing: 1,
            bullets: [None; MAX_BULLETS],
            next_bullet: 0,
            paused: false,
        }
    }

    /// Advance by `dt_ms`. Returns `true` when a bullet was fired.
    fn update(&mut self, actions: &Actions, now: Instant, dt_ms: i32, bounds: Size) -> bool {
        let step = |axis: i8| i32::from(axis) * PLAYER_SPEED * SUBPIXEL * dt_ms / (128 * 1000);
        let max_x = (bounds.width - PLAYER_SIZE.width) as i32 * SUBPIXEL;
        let max_y = (bounds.height - GROUND_HEIGHT - PLAYER_SIZE.height) as i32 * SUBPIXEL;

        let horizontal = actions.axis(Action::HorizontalMove);
        self.player.x = (self.player.x + step(horizontal)).clamp(0, max_x);
        self.player.y = (self.player.y + step(actions.axis(Action::VerticalMove))).clamp(0, max_y);
        if horizontal != 0 {
            self.facing = i32::from(horizontal.signum());
        }

        let width = bounds.width as i32 * SUBPIXEL;
        for slot in &mut self.bullets {
            if let Some(bullet) = slot {
                bullet.x += bullet.dx * dt_ms / 1000;
                if bullet.x < 0 || bullet.x >= width {
                    *slot = None;
                }
            }
        }

        if !actions.just_pressed_at(Action::Attack, now, Duration::from_ticks(0)) {
            return false;
        }
        self.bullets[self.next_bullet] = Some(Bullet {
            x: self.player.x,
            y: self.player.y + SUBPIXEL,
            dx: self.facing * BULLET_SPEED * SUBPIXEL,
        });
        self.next_bullet = (self.next_bullet + 1) % MAX_BULLETS;
        true
    }

    fn draw(&self, painter: &mut Painter<'_>) {
        let bounds = painter.resolution();
        painter.fill_screen_vertical_gradient([Rgb565::CSS_MIDNIGHT_BLUE, Rgb565::CSS_DARK_ORCHID]);
        painter.draw_grid_pattern(
            Point::new(0, (bounds.height - GROUND_HEIGHT) as i32),
            Size::new(bounds.width, GROUND_HEIGHT),
            [Rgb565::CSS_DARK_GREEN, Rgb565::CSS_FOREST_GREEN],
        );

        painter.draw_rectangle(self.player / SUBPIXEL, PLAYER_SIZE, Rgb565::WHITE);
        for bullet in self.bullets.iter().flatten() {
            let pos = Point::new(bullet.x, bullet.y) / SUBPIXEL;
            painter.draw_rectangle(pos, BULLET_SIZE, Rgb565::RED);
        }

        if self.paused {
            let style = MonoTextStyle::new(&FONT_6X10, Rgb565::YELLOW);
            let _ = Text::new("PAUSED", Point::new(bounds.width as i32 / 2 - 18, 12), style)
                .draw(painter);
        }
    }
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    let peripherals = gzn::init();
    let resources = split_resources!(peripherals);

    esp_alloc::heap_allocator!(size: 128 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let lcd: Lcd<'static> = resources.display.into();
    let mut buttons: Buttons = resources.buttons.into();
    let Speaker { clock, duty } = resources.speaker.into();

    let mut fs = AssetFs::new();
    fs.mount(Partition::new("sounds", SOUNDS)).unwrap();
    let (audio, streamer) =
        AudioManager::initialize(fs, clock, duty, AudioConfig::default()).unwrap();
    let audio = mk_static!(Audio, audio);
    gzn::speaker::register(audio.backend());

    let renderer = mk_static!(
        Renderer,
        Renderer::new(&lcd, RenderConfig::default()).unwrap()
    );
    let (mut painter, presenter) = renderer.split();
    let bounds = painter.resolution();

    spawner.must_spawn(render_task(presenter, lcd));
    spawner.must_spawn(audio_task(streamer, audio));

    painter.fill_screen_grid_pattern([Rgb565::BLACK, Rgb565::CSS_DARK_SLATE_GRAY]);
    let style = MonoTextStyle::new(&FONT_6X10, Rgb565::WHITE);
    let _ = Text::new("START", Point::new(bounds.width as i32 / 2 - 15, 20), style)
        .draw(&mut painter);
    painter.submit().await;
    Buttons::debounce_press_and_release(&mut buttons.start).await;

    let mut hum: Option<TrackId> = audio.play(&HUM).await.ok();
    let mut pad = ButtonPadTranslator;
    let mut actions = Actions::new();
    let mut game = Game::new(bounds);
    let mut last_frame = Instant::now();
    let mut fps = FpsCounter::new(last_frame);
    info!("game loop started at {}x{}", bounds.width, bounds.height);

    loop {
        let now = Instant::now();
        let dt_ms = (now - last_frame).as_millis().min(100) as i32;
        last_frame = now;

        actions.update(&mut pad, &buttons.report(), now);

        if actions.just_pressed_at(Action::Pause, now, Duration::from_ticks(0)) {
            game.paused = !game.paused;
            match (game.paused, hum.take()) {
                (true, Some(id)) => {
                    audio.stop(id).await;
                }
                (false, _) => hum = audio.play(&HUM).await.ok(),
                (true, None) => {}
            }
        }

        if !game.paused && game.update(&actions, now, dt_ms, bounds) {
            if let Err(err) = audio.play(&ATTACK).await {
                warn!("attack sound: {}", err);
            }
        }
        audio.update();

        game.draw(&mut painter);
        painter.draw_fps(Point::new(1, 1), fps.tick(now));
        painter.submit().await;
    }
}
