//! 从指令解释器一路打到文件系统的系统调用端到端测试。
//! 测试程序按 Nachos 式调用约定手工汇编：
//! 调用号进 r2，参数进 r4..r6，然后自陷。

mod common;

use common::{boot, build_noff, install};
use os::assemble::{addiu, addu, lb, syscall};
use os::machine::Machine;
use os::memory::policy::PolicyKind;
use os::memory::PagingMode;
use os::process;
use sector_fs::FsError;

const NUM_PHYS_PAGES: usize = os::config::NUM_PHYS_PAGES;

fn machine() -> Machine {
    Machine::new(PolicyKind::Fifo)
}

#[test]
fn exit_code_propagates() {
    let code = [addiu(4, 0, 42), addiu(2, 0, 1), syscall()];
    let (image, _) = build_noff(&code, &[], 0);

    let mut kernel = boot(PagingMode::Inverted, PolicyKind::Fifo);
    install(&kernel, "/prog.noff", &image);

    let (tid, status) = process::start(&mut kernel, &mut machine(), "/prog.noff").unwrap();
    assert_eq!(status, 42);

    // 线程谢幕后页帧与交换文件都不该留下
    assert_eq!(kernel.frames.mem_map.num_clear(), NUM_PHYS_PAGES);
    assert_eq!(
        kernel.fs.open(&format!("/swap_{tid}")).err(),
        Some(FsError::NotFound)
    );
    assert_eq!(kernel.threads.exit_code(tid), Some(42));
}

#[test]
fn halt_stops_the_machine() {
    let code = [addiu(2, 0, 0), syscall()];
    let (image, _) = build_noff(&code, &[], 0);

    let mut kernel = boot(PagingMode::Inverted, PolicyKind::Fifo);
    install(&kernel, "/halt.noff", &image);

    let (_, status) = process::start(&mut kernel, &mut machine(), "/halt.noff").unwrap();
    assert_eq!(status, 0);
    assert!(kernel.halted);
}

#[test]
fn create_write_close_through_syscalls() {
    // 数据段："/t.txt\0" 在 D，"hello" 在 D+7
    let d = 18 * 4;
    let code = [
        addiu(4, 0, d),
        addiu(2, 0, 4), // Create
        syscall(),
        addiu(4, 0, d),
        addiu(2, 0, 5), // Open
        syscall(),
        addu(9, 2, 0),
        addiu(4, 0, d + 7),
        addiu(5, 0, 5),
        addu(6, 9, 0),
        addiu(2, 0, 7), // Write
        syscall(),
        addu(4, 9, 0),
        addiu(2, 0, 8), // Close
        syscall(),
        addiu(4, 0, 0),
        addiu(2, 0, 1), // Exit
        syscall(),
    ];
    assert_eq!(code.len() * 4, d as usize);

    let (image, data_vaddr) = build_noff(&code, b"/t.txt\0hello", 0);
    assert_eq!(data_vaddr, d as u32);

    let mut kernel = boot(PagingMode::Inverted, PolicyKind::Fifo);
    install(&kernel, "/writer.noff", &image);
    let (_, status) = process::start(&mut kernel, &mut machine(), "/writer.noff").unwrap();
    assert_eq!(status, 0);

    let file = kernel.fs.open("/t.txt").unwrap();
    let mut out = [0; 5];
    assert_eq!(file.read_at(&mut out, 0), 5);
    assert_eq!(&out, b"hello");
}

#[test]
fn read_through_syscalls() {
    let d = 12 * 4; // 代码共 12 条指令
    let b = d + 8; // 读缓冲落在未初始化段里
    let code = [
        addiu(4, 0, d),
        addiu(2, 0, 5), // Open
        syscall(),
        addu(9, 2, 0),
        addiu(4, 0, b),
        addiu(5, 0, 2),
        addu(6, 9, 0),
        addiu(2, 0, 6), // Read
        syscall(),
        lb(4, 0, b), // 拿第一个字节当退出码
        addiu(2, 0, 1),
        syscall(),
    ];
    let (image, data_vaddr) = build_noff(&code, b"/in.txt\0", 4);
    assert_eq!(data_vaddr, d as u32);

    let mut kernel = boot(PagingMode::Inverted, PolicyKind::Fifo);
    kernel.fs.create("/in.txt", sector_fs::FileType::Txt).unwrap();
    kernel.fs.open("/in.txt").unwrap().write_at(b"ok", 0);
    install(&kernel, "/reader.noff", &image);

    let (_, status) = process::start(&mut kernel, &mut machine(), "/reader.noff").unwrap();
    assert_eq!(status, i32::from(b'o'));
}

#[test]
fn exec_and_join_report_the_child_exit_code() {
    let child = [addiu(4, 0, 7), addiu(2, 0, 1), syscall()];
    let (child_image, _) = build_noff(&child, &[], 0);

    let d = 10 * 4;
    let parent = [
        addiu(4, 0, d),
        addiu(2, 0, 2), // Exec
        syscall(),
        addu(9, 2, 0),
        addu(4, 9, 0),
        addiu(2, 0, 3), // Join
        syscall(),
        addu(4, 2, 0),
        addiu(2, 0, 1), // Exit(join result)
        syscall(),
    ];
    let (parent_image, _) = build_noff(&parent, b"/child.noff\0", 0);

    let mut kernel = boot(PagingMode::Inverted, PolicyKind::Fifo);
    install(&kernel, "/child.noff", &child_image);
    install(&kernel, "/parent.noff", &parent_image);

    let (tid, status) = process::start(&mut kernel, &mut machine(), "/parent.noff").unwrap();
    assert_eq!(status, 7);
    // 父子是两个线程
    assert_eq!(kernel.threads.exit_code(tid + 1), Some(7));
}

#[test]
fn fork_runs_a_function_in_the_same_space() {
    let d = 12 * 4;
    let func = 6 * 4;
    let code = [
        addiu(4, 0, func),
        addiu(2, 0, 9), // Fork
        syscall(),
        addiu(4, 0, 0),
        addiu(2, 0, 1), // 父线程 Exit 0
        syscall(),
        // func：创建 /forked 然后谢幕
        addiu(4, 0, d),
        addiu(2, 0, 4), // Create
        syscall(),
        addiu(4, 0, 0),
        addiu(2, 0, 1),
        syscall(),
    ];
    let (image, _) = build_noff(&code, b"/forked\0", 0);

    let mut kernel = boot(PagingMode::Inverted, PolicyKind::Fifo);
    install(&kernel, "/forker.noff", &image);
    let (_, status) = process::start(&mut kernel, &mut machine(), "/forker.noff").unwrap();

    assert_eq!(status, 0);
    assert!(kernel.fs.open("/forked").is_ok());
}

#[test]
fn syscalls_work_under_linear_paging_too() {
    let d = 18 * 4;
    let code = [
        addiu(4, 0, d),
        addiu(2, 0, 4),
        syscall(),
        addiu(4, 0, d),
        addiu(2, 0, 5),
        syscall(),
        addu(9, 2, 0),
        addiu(4, 0, d + 7),
        addiu(5, 0, 5),
        addu(6, 9, 0),
        addiu(2, 0, 7),
        syscall(),
        addu(4, 9, 0),
        addiu(2, 0, 8),
        syscall(),
        addiu(4, 0, 0),
        addiu(2, 0, 1),
        syscall(),
    ];
    let (image, _) = build_noff(&code, b"/l.txt\0linear", 0);

    let mut kernel = boot(PagingMode::Linear, PolicyKind::Lru);
    install(&kernel, "/writer.noff", &image);
    let (_, status) =
        process::start(&mut kernel, &mut Machine::new(PolicyKind::Lru), "/writer.noff").unwrap();
    assert_eq!(status, 0);

    let file = kernel.fs.open("/l.txt").unwrap();
    let mut out = [0; 5];
    // 只写了 5 字节
    assert_eq!(file.read_at(&mut out, 0), 5);
    assert_eq!(&out, b"linea");

    // 线性分页不建交换文件
    assert_eq!(kernel.fs.open("/swap_0").err(), Some(FsError::NotFound));
}
