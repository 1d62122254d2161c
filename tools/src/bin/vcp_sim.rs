// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single bottleneck simulation: a number of VCP senders share one router
//! output link towards their receivers. ACKs return over an uncongested path.

use std::cmp;
use std::time::Duration;
use std::time::Instant;

use clap::Parser;
use log::debug;
use log::info;
use log::warn;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;
use statrs::statistics::OrderStatistics;

use vcp::ControlLaw;
use vcp::FeedbackEcho;
use vcp::LinkQueue;
use vcp::LoadEstimator;
use vcp::PacketMeta;
use vcp::RouterConfig;
use vcp::SenderConfig;
use vcp::SenderFlow;
use vcp::Timer;
use vcp::TimerKey;
use vcp::TimerQueue;
use vcp::VcpQueue;
use vcp::VcpSink;
use vcp::VcpTables;
use vcp_tools::fairness_index;
use vcp_tools::DropTailQueue;
use vcp_tools::EventQueue;
use vcp_tools::Result;

#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Timer owner of the bottleneck router. Flows own their identifiers.
const ROUTER_ID: u64 = 0;

const ROUTER_TIMERS: [Timer; 2] = [Timer::QueueSampling, Timer::LoadMeasurement];

const FLOW_TIMERS: [Timer; 3] = [Timer::HoldDownFirst, Timer::HoldDownSecond, Timer::Pacing];

#[derive(Parser, Debug, Clone)]
#[clap(name = "vcp_sim")]
pub struct SimOpt {
    /// Number of flows sharing the bottleneck.
    #[clap(short, long, default_value = "4", value_name = "NUM")]
    pub flows: u64,

    /// Bottleneck capacity in Mbps.
    #[clap(short, long, default_value = "10", value_name = "NUM")]
    pub capacity: f64,

    /// Bottleneck buffer size in packets.
    #[clap(long, default_value = "1000", value_name = "NUM")]
    pub buffer: usize,

    /// Base round-trip propagation delay in milliseconds.
    #[clap(long, default_value = "80", value_name = "TIME")]
    pub rtt: u64,

    /// Maximum extra round-trip delay of each flow in milliseconds.
    #[clap(long, default_value = "0", value_name = "TIME")]
    pub rtt_spread: u64,

    /// Flows start at random times within this window, in milliseconds.
    #[clap(long, default_value = "0", value_name = "TIME")]
    pub start_spread: u64,

    /// Simulated duration in seconds.
    #[clap(short, long, default_value = "30", value_name = "TIME")]
    pub duration: u64,

    /// Control law, "coded" or "raw".
    #[clap(long, default_value = "coded", value_name = "STR")]
    pub control_law: ControlLaw,

    /// Router load measurement interval in milliseconds.
    #[clap(long, default_value = "200", value_name = "TIME")]
    pub measurement_interval: u64,

    /// Smooth the load factor across measurement intervals.
    #[clap(long)]
    pub smoothing: bool,

    /// Disable pacing of small windows.
    #[clap(long)]
    pub disable_pacing: bool,

    /// Bound additive increase by the window-indexed limiter.
    #[clap(long)]
    pub ai_limiter: bool,

    /// Data packet size in bytes.
    #[clap(long, default_value = "1000", value_name = "NUM")]
    pub packet_size: usize,

    /// Interval between two progress reports in milliseconds.
    #[clap(long, default_value = "1000", value_name = "TIME")]
    pub report_interval: u64,

    /// Seed of the random start times and delays.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub seed: u64,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

/// Events of the packet path outside the library components.
#[derive(Debug)]
enum Event {
    /// A flow starts sending.
    Start(u64),

    /// A data packet arrives at the bottleneck.
    Arrival(PacketMeta),

    /// The bottleneck finished transmitting a packet.
    Transmitted(PacketMeta),

    /// A data packet arrives at its receiver.
    Delivery(PacketMeta),

    /// An acknowledgment arrives at its sender.
    AckArrival(PacketMeta),

    /// Print progress.
    Report,
}

/// A sender, its receiver and the path delays between them.
struct FlowContext {
    flow: SenderFlow,

    sink: VcpSink,

    /// Sender to router, and router to receiver delay.
    forward_delay: Duration,

    /// Receiver to sender delay.
    reverse_delay: Duration,

    /// Time the flow started.
    start_time: Option<Instant>,

    /// Congestion window samples taken at reports.
    cwnd_samples: Vec<f64>,
}

struct Simulator {
    option: SimOpt,

    router: VcpQueue<DropTailQueue>,

    /// Whether the bottleneck is transmitting.
    link_busy: bool,

    flows: FxHashMap<u64, FlowContext>,

    timers: TimerQueue,

    events: EventQueue<Event>,

    start: Instant,

    now: Instant,

    /// Utilization samples, one per report.
    utilization: Vec<f64>,

    /// Queue length samples in packets, one per report.
    queue_lengths: Vec<f64>,

    /// Bytes leaving the bottleneck since the last report.
    transmitted: u64,
}

impl Simulator {
    fn new(option: SimOpt) -> Result<Self> {
        let tables = VcpTables::shared();
        let start = Instant::now();
        let mut rng = StdRng::seed_from_u64(option.seed);

        let mut router_conf = RouterConfig::new();
        router_conf.set_capacity(option.capacity * 1e6);
        router_conf.set_measurement_interval(Duration::from_millis(option.measurement_interval));
        router_conf.enable_encode(option.control_law == ControlLaw::Coded);
        router_conf.enable_smoothing(option.smoothing);
        let router = VcpQueue::new(
            DropTailQueue::new(option.buffer),
            &router_conf,
            tables.clone(),
            start,
        )?;

        let mut sender_conf = SenderConfig::new();
        sender_conf
            .set_router_measurement_interval(Duration::from_millis(option.measurement_interval));
        sender_conf.set_control_law(option.control_law);
        sender_conf.enable_pacing(!option.disable_pacing);
        sender_conf.enable_ai_limiter(option.ai_limiter);
        sender_conf.set_packet_size(option.packet_size);

        let mut events = EventQueue::new();
        let mut flows = FxHashMap::default();
        for flow_id in 1..=option.flows {
            let rtt = option.rtt + rng.gen_range(0..=option.rtt_spread);
            let offset = rng.gen_range(0..=option.start_spread);
            flows.insert(
                flow_id,
                FlowContext {
                    flow: SenderFlow::new(flow_id, &sender_conf, tables.clone())?,
                    sink: VcpSink::default(),
                    forward_delay: Duration::from_millis(rtt / 4),
                    reverse_delay: Duration::from_millis(rtt - rtt / 4 * 2),
                    start_time: None,
                    cwnd_samples: Vec::new(),
                },
            );
            events.push(start + Duration::from_millis(offset), Event::Start(flow_id));
            debug!("flow {} rtt {}ms starts after {}ms", flow_id, rtt, offset);
        }
        events.push(
            start + Duration::from_millis(option.report_interval),
            Event::Report,
        );

        let mut sim = Simulator {
            option,
            router,
            link_busy: false,
            flows,
            timers: TimerQueue::with_capacity(64),
            events,
            start,
            now: start,
            utilization: Vec::new(),
            queue_lengths: Vec::new(),
            transmitted: 0,
        };
        sim.sync_router_timers();
        Ok(sim)
    }

    /// Run the simulation until the configured duration elapsed.
    fn run(&mut self) -> Result<()> {
        let end = self.start + Duration::from_secs(self.option.duration);

        loop {
            let next = match (self.timers.next_deadline(), self.events.next_time()) {
                (Some(a), Some(b)) => cmp::min(a, b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => break,
            };
            if next > end {
                break;
            }
            self.now = next;

            while let Some(key) = self.timers.next_expire(self.now) {
                self.on_timer(key)?;
            }
            while let Some(event) = self.events.pop_expired(self.now) {
                self.on_event(event)?;
            }
        }

        Ok(())
    }

    fn on_timer(&mut self, key: TimerKey) -> Result<()> {
        let now = self.now;
        if key.owner == ROUTER_ID {
            self.router.on_timer(key.timer, now)?;
            self.sync_router_timers();
            return Ok(());
        }

        let packets = match self.flows.get_mut(&key.owner) {
            Some(ctx) => ctx.flow.on_timer(key.timer, now)?,
            None => return Ok(()),
        };
        self.send(key.owner, packets);
        self.sync_flow_timers(key.owner);
        Ok(())
    }

    fn on_event(&mut self, event: Event) -> Result<()> {
        let now = self.now;
        match event {
            Event::Start(flow_id) => {
                let packets = match self.flows.get_mut(&flow_id) {
                    Some(ctx) => {
                        ctx.start_time = Some(now);
                        ctx.flow.send_much(now)
                    }
                    None => return Ok(()),
                };
                info!("flow {} started", flow_id);
                self.send(flow_id, packets);
                self.sync_flow_timers(flow_id);
            }

            Event::Arrival(packet) => {
                let (flow_id, seq) = (packet.flow_id, packet.seq);
                if !self.router.enqueue(packet) {
                    warn!("flow {} packet {} dropped at the bottleneck", flow_id, seq);
                }
                if !self.link_busy {
                    self.transmit();
                }
            }

            Event::Transmitted(packet) => {
                self.transmitted += packet.size as u64;
                if let Some(ctx) = self.flows.get(&packet.flow_id) {
                    self.events
                        .push(now + ctx.forward_delay, Event::Delivery(packet));
                }
                self.transmit();
            }

            Event::Delivery(packet) => {
                if let Some(ctx) = self.flows.get_mut(&packet.flow_id) {
                    if let Some(ack) = ctx.sink.on_data(&packet, now)? {
                        self.events
                            .push(now + ctx.reverse_delay, Event::AckArrival(ack));
                    }
                }
            }

            Event::AckArrival(ack) => {
                let flow_id = ack.flow_id;
                let packets = match self.flows.get_mut(&flow_id) {
                    Some(ctx) => ctx.flow.on_ack(&ack, now)?,
                    None => return Ok(()),
                };
                self.send(flow_id, packets);
                self.sync_flow_timers(flow_id);
            }

            Event::Report => {
                self.report();
                self.events.push(
                    now + Duration::from_millis(self.option.report_interval),
                    Event::Report,
                );
            }
        }

        Ok(())
    }

    /// Put packets on the path towards the bottleneck.
    fn send(&mut self, flow_id: u64, packets: Vec<PacketMeta>) {
        let delay = match self.flows.get(&flow_id) {
            Some(ctx) => ctx.forward_delay,
            None => return,
        };
        for packet in packets {
            self.events.push(self.now + delay, Event::Arrival(packet));
        }
    }

    /// Start transmitting the head of the bottleneck queue.
    fn transmit(&mut self) {
        match self.router.dequeue() {
            Some(packet) => {
                let secs = packet.size as f64 * 8.0 / (self.option.capacity * 1e6);
                self.events.push(
                    self.now + Duration::from_secs_f64(secs),
                    Event::Transmitted(packet),
                );
                self.link_busy = true;
            }
            None => self.link_busy = false,
        }
    }

    fn sync_router_timers(&mut self) {
        for timer in ROUTER_TIMERS {
            let key = TimerKey::new(ROUTER_ID, timer);
            match self.router.timer_deadline(timer) {
                Some(deadline) => self.timers.add_at(key, deadline),
                None => self.timers.del(&key),
            }
        }
    }

    fn sync_flow_timers(&mut self, flow_id: u64) {
        let ctx = match self.flows.get(&flow_id) {
            Some(ctx) => ctx,
            None => return,
        };
        for timer in FLOW_TIMERS {
            let key = TimerKey::new(flow_id, timer);
            match ctx.flow.timer_deadline(timer) {
                Some(deadline) => self.timers.add_at(key, deadline),
                None => self.timers.del(&key),
            }
        }
    }

    fn report(&mut self) {
        let interval = Duration::from_millis(self.option.report_interval).as_secs_f64();
        let utilization = self.transmitted as f64 * 8.0 / (self.option.capacity * 1e6 * interval);
        self.transmitted = 0;
        self.utilization.push(utilization);
        self.queue_lengths.push(self.router.len() as f64);

        let mut ids: Vec<u64> = self.flows.keys().copied().collect();
        ids.sort_unstable();
        let mut cwnds = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(ctx) = self.flows.get_mut(&id) {
                let cwnd = ctx.flow.controller().congestion_window();
                ctx.cwnd_samples.push(cwnd);
                cwnds.push(format!("{}:{:.2}", id, cwnd));
            }
        }

        info!(
            "t={:.1}s util {:.3} queue {} lf {:.1} cwnd [{}]",
            self.now.duration_since(self.start).as_secs_f64(),
            utilization,
            self.router.len(),
            self.router.sample().load_factor,
            cwnds.join(" ")
        );
    }

    fn print_summary(&self) {
        let elapsed = self.now.duration_since(self.start).as_secs_f64();
        println!(
            "{} flows over {} Mbps for {:.1}s, control law {:?}",
            self.option.flows, self.option.capacity, elapsed, self.option.control_law
        );

        if !self.utilization.is_empty() {
            let mut s = Data::new(self.utilization.clone());
            println!("bottleneck utilization:");
            println!(
                "\tmin: {:.3}, max: {:.3}, mean: {:.3}, median: {:.3}",
                s.min(),
                s.max(),
                s.mean().unwrap_or_default(),
                s.median(),
            );

            let mut q = Data::new(self.queue_lengths.clone());
            println!("bottleneck queue(packets):");
            println!(
                "\tmean: {:.1}, p90: {:.1}, p99: {:.1}, max: {:.1}",
                q.mean().unwrap_or_default(),
                q.percentile(90),
                q.percentile(99),
                q.max(),
            );
        }

        let mut ids: Vec<u64> = self.flows.keys().copied().collect();
        ids.sort_unstable();
        let mut rates = Vec::with_capacity(ids.len());
        for id in ids {
            let ctx = match self.flows.get(&id) {
                Some(ctx) => ctx,
                None => continue,
            };
            let active = ctx
                .start_time
                .map(|t| self.now.duration_since(t).as_secs_f64())
                .unwrap_or_default();
            let rate = if active > 0.0 {
                ctx.sink.stats().bytes as f64 * 8.0 / active / 1e6
            } else {
                0.0
            };
            rates.push(rate);

            let stats = ctx.flow.controller().stats();
            let cwnd = Data::new(ctx.cwnd_samples.clone());
            println!(
                "flow {}: {:.3} Mbps, mean cwnd {:.2}, sd {:.2}, acks {}, mi {}, ai {}, md {}, frz {}",
                id,
                rate,
                cwnd.mean().unwrap_or_default(),
                cwnd.std_dev().unwrap_or_default(),
                stats.acks,
                stats.mi_count,
                stats.ai_count,
                stats.md_count,
                stats.frz_count,
            );
        }

        println!(
            "fairness index: {:.4}, drops: {}",
            fairness_index(&rates),
            self.router.inner().drops()
        );
    }
}

fn main() -> Result<()> {
    let option = SimOpt::parse();

    env_logger::builder()
        .target(vcp_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    let mut sim = Simulator::new(option)?;
    sim.run()?;
    sim.print_summary();

    Ok(())
}
