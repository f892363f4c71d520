use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use multidown::cli::Args;
use multidown::config::Config;
use multidown::ui::{self, DownloadSummary, ProgressCallback, ProgressManager, TaskNotice};
use multidown::utils::logger;
use multidown::utils::retry::RetryStrategy;
use multidown::utils::validator::file_name_from_url;
use multidown::{task_key, DownloadCallback, DownloadEvent, DownloadManager, DownloadRequest};

const KEYBOARD_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAction {
    PauseAll,
    Resume,
    CancelAll,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Active,
    Retrying,
    Paused,
    Completed,
    Canceled,
    Failed,
}

struct Job {
    tag: String,
    request: DownloadRequest,
    callback: Arc<dyn DownloadCallback>,
    bar: indicatif::ProgressBar,
    state: JobState,
    attempts: usize,
}

#[actix::main]
async fn main() {
    if let Err(e) = run().await {
        let _ = terminal::disable_raw_mode();
        log::error!("程序异常退出: {:#}", e);
        ui::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let (args, config) = Args::parse_args()?;
    logger::init(&config.log_file, &config.log_level)?;
    log::info!("程序启动\n{}", config.get_summary());

    let urls = args.get_urls()?;
    println!("{}", config.get_summary());

    let manager = DownloadManager::init(config.clone())?;
    let strategy = RetryStrategy::from_config(&config);
    let progress = ProgressManager::new();
    let (notice_tx, mut notices) = mpsc::unbounded_channel::<TaskNotice>();

    let mut jobs: Vec<Job> = urls
        .iter()
        .enumerate()
        .map(|(index, url)| {
            let destination = destination_for(&config, &args, url, urls.len());
            let name = destination
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| url.clone());
            let bar = progress.add_task(&name);
            let callback: Arc<dyn DownloadCallback> =
                Arc::new(ProgressCallback::new(index, bar.clone(), notice_tx.clone()));
            Job {
                tag: destination.display().to_string(),
                request: DownloadRequest::new(url.clone(), destination).with_resume(!args.fresh),
                callback,
                bar,
                state: JobState::Active,
                attempts: 0,
            }
        })
        .collect();
    drop(notice_tx);

    for job in jobs.iter_mut() {
        start_job(&manager, job).await;
    }

    println!("\n开始下载... (按 'p' 暂停, 'r' 继续, 'c' 取消, 'q' 暂停并退出)");
    let started = Instant::now();
    terminal::enable_raw_mode()?;
    let result = event_loop(&manager, &strategy, &progress, &mut jobs, &mut notices).await;
    terminal::disable_raw_mode()?;
    result?;

    let summary = summarize(&jobs, started.elapsed());
    log::info!(
        "下载结束 - 成功: {}, 暂停: {}, 取消: {}, 失败: {}",
        summary.success_count,
        summary.paused_count,
        summary.canceled_count,
        summary.failed_count
    );
    println!("{}", summary);
    Ok(())
}

/// 目标路径：单个URL时允许 `-n` 指定文件名
fn destination_for(config: &Config, args: &Args, url: &str, url_count: usize) -> PathBuf {
    let name = match (&args.file_name, url_count) {
        (Some(name), 1) => name.clone(),
        // 文件名必须稳定，下次运行才能找到同一组分段
        _ => file_name_from_url(url).unwrap_or_else(|| format!("download_{}", &task_key(url)[..8])),
    };
    Path::new(&config.download_dir).join(name)
}

async fn start_job(manager: &DownloadManager, job: &mut Job) {
    match manager.download(job.request.clone(), &job.tag, job.callback.clone()).await {
        Ok(()) => job.state = JobState::Active,
        Err(e) => {
            log::error!("启动下载失败: {} - {}", job.request.url, e);
            job.bar.abandon_with_message(format!("✗ {}", e));
            job.state = JobState::Failed;
        }
    }
}

async fn event_loop(
    manager: &DownloadManager,
    strategy: &RetryStrategy,
    progress: &ProgressManager,
    jobs: &mut [Job],
    notices: &mut mpsc::UnboundedReceiver<TaskNotice>,
) -> anyhow::Result<()> {
    let (key_tx, mut keys) = mpsc::unbounded_channel();
    // crossterm 的读取是阻塞的
    tokio::task::spawn_blocking(move || read_keys(key_tx));
    let (retry_tx, mut retries) = mpsc::unbounded_channel::<usize>();
    let mut quitting = false;

    loop {
        let active = jobs.iter().any(|j| matches!(j.state, JobState::Active | JobState::Retrying));
        let paused = jobs.iter().any(|j| j.state == JobState::Paused);
        if !active && (quitting || !paused) {
            break;
        }

        tokio::select! {
            Some(notice) = notices.recv() => {
                let Some(job) = jobs.get_mut(notice.index) else { continue };
                match notice.event {
                    DownloadEvent::Completed => job.state = JobState::Completed,
                    DownloadEvent::Paused => job.state = JobState::Paused,
                    DownloadEvent::Canceled => job.state = JobState::Canceled,
                    DownloadEvent::Failed(error) => {
                        if !quitting && strategy.should_retry(&error, job.attempts) {
                            let delay = strategy.get_delay(job.attempts);
                            job.attempts += 1;
                            job.state = JobState::Retrying;
                            progress.println(&format!(
                                "{} 失败: {}，{:.1} 秒后第 {} 次重试",
                                job.tag, error, delay.as_secs_f64(), job.attempts
                            ));
                            log::warn!("{} 失败: {}，{:?} 后重试", job.tag, error, delay);
                            let retry_tx = retry_tx.clone();
                            let index = notice.index;
                            actix::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = retry_tx.send(index);
                            });
                        } else {
                            log::error!("{} 下载失败: {}", job.tag, error);
                            job.state = JobState::Failed;
                        }
                    }
                    _ => {}
                }
            }
            Some(index) = retries.recv() => {
                if let Some(job) = jobs.get_mut(index).filter(|j| j.state == JobState::Retrying) {
                    start_job(manager, job).await;
                }
            }
            Some(action) = keys.recv() => {
                log::info!("用户操作: {:?}", action);
                match action {
                    KeyAction::PauseAll | KeyAction::Quit => {
                        manager.pause_all().await?;
                        for job in jobs.iter_mut().filter(|j| j.state == JobState::Retrying) {
                            job.state = JobState::Paused;
                        }
                        quitting |= action == KeyAction::Quit;
                    }
                    KeyAction::Resume => {
                        for job in jobs.iter_mut().filter(|j| j.state == JobState::Paused) {
                            start_job(manager, job).await;
                        }
                    }
                    KeyAction::CancelAll => {
                        manager.cancel_all().await?;
                        // 已暂停的任务不在注册表中，直接清理
                        for job in jobs.iter_mut().filter(|j| matches!(j.state, JobState::Paused | JobState::Retrying)) {
                            manager.delete(&job.tag).await?;
                            let _ = tokio::fs::remove_file(job.request.part_path()).await;
                            job.bar.abandon_with_message("已取消");
                            job.state = JobState::Canceled;
                        }
                    }
                }
            }
            else => break,
        }
    }

    Ok(())
}

fn read_keys(tx: mpsc::UnboundedSender<KeyAction>) {
    while !tx.is_closed() {
        match event::poll(KEYBOARD_POLL_INTERVAL) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(_) => return,
        }
        let Ok(Event::Key(key)) = event::read() else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let action = match key.code {
            KeyCode::Char('p') | KeyCode::Char('P') => KeyAction::PauseAll,
            KeyCode::Char('r') | KeyCode::Char('R') => KeyAction::Resume,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => KeyAction::Quit,
            KeyCode::Char('c') | KeyCode::Char('C') => KeyAction::CancelAll,
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => KeyAction::Quit,
            _ => continue,
        };
        if tx.send(action).is_err() {
            return;
        }
    }
}

fn summarize(jobs: &[Job], elapsed: Duration) -> DownloadSummary {
    let mut summary = DownloadSummary { total_files: jobs.len(), elapsed_time: elapsed, ..Default::default() };
    for job in jobs {
        match job.state {
            JobState::Completed => {
                summary.success_count += 1;
                summary.total_size += job.bar.length().unwrap_or(0);
            }
            JobState::Paused | JobState::Active | JobState::Retrying => summary.paused_count += 1,
            JobState::Canceled => summary.canceled_count += 1,
            JobState::Failed => summary.failed_count += 1,
        }
    }
    summary
}
